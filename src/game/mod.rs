use serde::{Deserialize, Serialize};
use std::fmt;

pub mod state;
pub mod tally;

pub use state::{Countdown, GameState};

/// Chat-platform id of a group (server/community). One independent game per group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

/// Chat-platform id of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

/// Chat-platform id of the channel game broadcasts are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Destination for countdown broadcasts.
///
/// Only the raw channel id survives a restart; until the platform collaborator
/// confirms the channel still exists, the reference stays `Unresolved` and the
/// scheduler skips the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRef {
    /// No broadcast destination recorded yet.
    Unset,
    /// A persisted channel id that has not been re-confirmed since startup.
    Unresolved(ChannelId),
    /// A channel id confirmed reachable by the platform collaborator.
    Resolved(ChannelId),
}

impl ChannelRef {
    pub fn id(&self) -> Option<ChannelId> {
        match self {
            ChannelRef::Unset => None,
            ChannelRef::Unresolved(id) | ChannelRef::Resolved(id) => Some(*id),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ChannelRef::Resolved(_))
    }
}

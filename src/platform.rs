//! Boundary contracts toward the chat platform.
//!
//! Command parsing, authorization, role membership, and message formatting
//! all live outside this crate; these traits are the seams the external
//! integration plugs into.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::game::{ChannelId, GroupId, PlayerId};

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("roster lookup failed: {0}")]
    Roster(String),
    #[error("broadcast delivery failed: {0}")]
    Delivery(String),
}

/// One tally line: a target and everyone currently voting for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TallyEntry {
    pub target: PlayerId,
    pub voters: Vec<PlayerId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data")]
pub enum BroadcastKind {
    /// Periodic countdown status while the hammer is running.
    PeriodicUpdate { remaining_secs: i64 },
    /// The countdown ran out. `eliminated` is `None` when nobody had voted.
    Expiry { eliminated: Option<PlayerId> },
}

/// Payload handed to the notification collaborator, which owns all
/// human-facing formatting and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastEvent {
    pub group_id: GroupId,
    pub channel_id: ChannelId,
    #[serde(flatten)]
    pub kind: BroadcastKind,
    pub tally: Vec<TallyEntry>,
}

/// Authoritative view of who currently holds the "player" designation in a
/// group. Queried fresh for every computation, never cached here.
#[async_trait]
pub trait Roster: Send + Sync {
    async fn active_players(&self, group_id: GroupId) -> Result<Vec<PlayerId>, PlatformError>;
}

/// Outbound side of the platform integration: confirming broadcast channels
/// and delivering countdown events.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Re-confirm a persisted channel id after a restart. `Ok(None)` means
    /// the channel cannot be resolved yet; the scheduler will retry on a
    /// later tick.
    async fn resolve_channel(
        &self,
        group_id: GroupId,
        channel_id: ChannelId,
    ) -> Result<Option<ChannelId>, PlatformError>;

    async fn send(&self, event: BroadcastEvent) -> Result<(), PlatformError>;
}

/// Stand-in broadcaster for running the engine without a chat platform
/// attached: resolves every channel and writes events to the log.
#[derive(Debug, Default)]
pub struct LogBroadcaster;

#[async_trait]
impl Broadcaster for LogBroadcaster {
    async fn resolve_channel(
        &self,
        _group_id: GroupId,
        channel_id: ChannelId,
    ) -> Result<Option<ChannelId>, PlatformError> {
        Ok(Some(channel_id))
    }

    async fn send(&self, event: BroadcastEvent) -> Result<(), PlatformError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| PlatformError::Delivery(e.to_string()))?;
        tracing::info!(
            group.id = %event.group_id,
            channel.id = %event.channel_id,
            event = %payload,
            "Countdown broadcast"
        );
        Ok(())
    }
}

use chrono::{DateTime, TimeDelta, Utc};
use indexmap::IndexMap;
use std::collections::BTreeSet;

use crate::game::{ChannelId, ChannelRef, GroupId, PlayerId};

/// A running "hammer" countdown. Both timestamps exist exactly as long as the
/// countdown is active, so holding them together in one optional struct keeps
/// the state well-formed by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    /// Moment the countdown expires and the top-voted player is eliminated.
    pub ends_at: DateTime<Utc>,
    /// Last time a periodic status broadcast went out. Never decreases.
    pub last_broadcast_at: DateTime<Utc>,
}

/// In-memory record of one group's elimination game.
///
/// All mutations here are pure; the registry owns the canonical copy and
/// mirrors every change into the persistent store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    group_id: GroupId,
    active: bool,
    /// voter -> target, at most one live vote per voter. Insertion order is
    /// kept so tallies (and the expiry tie-break) are deterministic.
    votes: IndexMap<PlayerId, PlayerId>,
    eliminated: BTreeSet<PlayerId>,
    countdown: Option<Countdown>,
    channel: ChannelRef,
}

impl GameState {
    pub fn new(group_id: GroupId) -> Self {
        GameState {
            group_id,
            active: false,
            votes: IndexMap::new(),
            eliminated: BTreeSet::new(),
            countdown: None,
            channel: ChannelRef::Unset,
        }
    }

    /// Rebuild a state from persisted records. The channel id, if any, comes
    /// back `Unresolved` until the platform collaborator re-confirms it.
    pub fn restore(
        group_id: GroupId,
        active: bool,
        channel: Option<ChannelId>,
        countdown: Option<Countdown>,
        votes: IndexMap<PlayerId, PlayerId>,
        eliminated: BTreeSet<PlayerId>,
    ) -> Self {
        GameState {
            group_id,
            active,
            votes,
            eliminated,
            countdown,
            channel: match channel {
                Some(id) => ChannelRef::Unresolved(id),
                None => ChannelRef::Unset,
            },
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn votes(&self) -> &IndexMap<PlayerId, PlayerId> {
        &self.votes
    }

    pub fn eliminated(&self) -> &BTreeSet<PlayerId> {
        &self.eliminated
    }

    pub fn is_eliminated(&self, player: PlayerId) -> bool {
        self.eliminated.contains(&player)
    }

    pub fn countdown(&self) -> Option<&Countdown> {
        self.countdown.as_ref()
    }

    pub fn channel(&self) -> ChannelRef {
        self.channel
    }

    /// Mark a fresh game as running and bind its broadcast channel. The
    /// channel came straight from a live command, so it is already resolved.
    pub fn begin(&mut self, channel: ChannelId) {
        self.active = true;
        self.channel = ChannelRef::Resolved(channel);
    }

    /// Set or overwrite the voter's entry. Whether voter and target are valid
    /// players is the caller's policy, not this layer's.
    pub fn cast_vote(&mut self, voter: PlayerId, target: PlayerId) {
        self.votes.insert(voter, target);
    }

    /// Delete the voter's entry. Returns whether a vote was actually removed.
    pub fn remove_vote(&mut self, voter: PlayerId) -> bool {
        self.votes.shift_remove(&voter).is_some()
    }

    /// Mark a player as out of the game and purge every vote they cast or
    /// received. Returns the voters whose entries were removed so the caller
    /// can mirror each deletion into the store.
    pub fn eliminate(&mut self, player: PlayerId) -> Vec<PlayerId> {
        self.eliminated.insert(player);
        let purged: Vec<PlayerId> = self
            .votes
            .iter()
            .filter(|(voter, target)| **voter == player || **target == player)
            .map(|(voter, _)| *voter)
            .collect();
        for voter in &purged {
            self.votes.shift_remove(voter);
        }
        purged
    }

    pub fn start_countdown(&mut self, now: DateTime<Utc>, duration: TimeDelta, channel: ChannelId) {
        self.active = true;
        self.channel = ChannelRef::Resolved(channel);
        self.countdown = Some(Countdown {
            ends_at: now + duration,
            last_broadcast_at: now,
        });
    }

    /// Stop an active countdown without resolving it (used on expiry and when
    /// votes are wiped mid-game).
    pub fn clear_countdown(&mut self) {
        self.countdown = None;
    }

    /// Record that a periodic broadcast went out. Returns the updated
    /// countdown so the caller can mirror it, or `None` if no countdown runs.
    pub fn mark_broadcast(&mut self, now: DateTime<Utc>) -> Option<Countdown> {
        let countdown = self.countdown.as_mut()?;
        if now > countdown.last_broadcast_at {
            countdown.last_broadcast_at = now;
        }
        Some(*countdown)
    }

    pub fn clear_votes(&mut self) {
        self.votes.clear();
    }

    /// Time left on the countdown, clamped to zero. `None` when no countdown
    /// is running.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let countdown = self.countdown.as_ref()?;
        Some((countdown.ends_at - now).max(TimeDelta::zero()))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.time_remaining(now), Some(remaining) if remaining.is_zero())
    }

    pub fn resolve_channel(&mut self) {
        if let ChannelRef::Unresolved(id) = self.channel {
            self.channel = ChannelRef::Resolved(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        GameState::new(GroupId(1))
    }

    #[test]
    fn cast_vote_overwrites_previous_vote() {
        let mut game = state();
        game.cast_vote(PlayerId(1), PlayerId(2));
        game.cast_vote(PlayerId(1), PlayerId(3));

        assert_eq!(game.votes().len(), 1);
        assert_eq!(game.votes().get(&PlayerId(1)), Some(&PlayerId(3)));
    }

    #[test]
    fn remove_vote_is_idempotent() {
        let mut game = state();
        game.cast_vote(PlayerId(1), PlayerId(2));

        assert!(game.remove_vote(PlayerId(1)));
        assert!(!game.remove_vote(PlayerId(1)));
        assert!(game.votes().is_empty());
    }

    #[test]
    fn eliminate_purges_votes_in_both_directions() {
        let mut game = state();
        game.cast_vote(PlayerId(1), PlayerId(2)); // vote by the eliminated player's target
        game.cast_vote(PlayerId(2), PlayerId(3)); // vote cast by the eliminated player
        game.cast_vote(PlayerId(4), PlayerId(2)); // another vote on the eliminated player
        game.cast_vote(PlayerId(5), PlayerId(3)); // untouched

        let mut purged = game.eliminate(PlayerId(2));
        purged.sort();

        assert_eq!(purged, vec![PlayerId(1), PlayerId(2), PlayerId(4)]);
        assert!(game.is_eliminated(PlayerId(2)));
        assert_eq!(game.votes().len(), 1);
        assert_eq!(game.votes().get(&PlayerId(5)), Some(&PlayerId(3)));
        for (voter, target) in game.votes() {
            assert_ne!(*voter, PlayerId(2));
            assert_ne!(*target, PlayerId(2));
        }
    }

    #[test]
    fn countdown_lifecycle() {
        let mut game = state();
        let t0 = Utc::now();
        assert_eq!(game.time_remaining(t0), None);
        assert!(!game.is_expired(t0));

        game.start_countdown(t0, TimeDelta::hours(24), ChannelId(7));
        assert!(game.is_active());
        assert_eq!(game.channel(), ChannelRef::Resolved(ChannelId(7)));
        assert_eq!(
            game.time_remaining(t0 + TimeDelta::hours(23)),
            Some(TimeDelta::hours(1))
        );
        assert!(!game.is_expired(t0 + TimeDelta::hours(23)));

        // Past the deadline the remaining time clamps to zero.
        let late = t0 + TimeDelta::hours(24) + TimeDelta::minutes(1);
        assert_eq!(game.time_remaining(late), Some(TimeDelta::zero()));
        assert!(game.is_expired(late));

        game.clear_countdown();
        assert_eq!(game.countdown(), None);
        assert!(!game.is_expired(late));
    }

    #[test]
    fn mark_broadcast_never_moves_backwards() {
        let mut game = state();
        let t0 = Utc::now();
        game.start_countdown(t0, TimeDelta::hours(24), ChannelId(7));

        let t1 = t0 + TimeDelta::hours(4);
        game.mark_broadcast(t1);
        game.mark_broadcast(t0); // stale clock reading must not rewind
        assert_eq!(game.countdown().map(|c| c.last_broadcast_at), Some(t1));
    }

    #[test]
    fn restored_channel_starts_unresolved() {
        let mut game = GameState::restore(
            GroupId(1),
            true,
            Some(ChannelId(9)),
            None,
            IndexMap::new(),
            BTreeSet::new(),
        );
        assert_eq!(game.channel(), ChannelRef::Unresolved(ChannelId(9)));
        assert!(!game.channel().is_resolved());

        game.resolve_channel();
        assert_eq!(game.channel(), ChannelRef::Resolved(ChannelId(9)));
    }
}

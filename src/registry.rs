//! Process-wide map from group id to game state.
//!
//! The registry owns the canonical in-memory copy of every game and mirrors
//! each mutation into the injected [`GameStore`]. Entries are wrapped in a
//! per-group mutex: mutations and scheduler ticks serialize per group, while
//! different groups never contend with each other.

use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::game::{ChannelId, GameState, GroupId, PlayerId, tally};
use crate::platform::{PlatformError, Roster};
use crate::store::{GameStore, StoreResult, log_write_failure};

pub struct GameRegistry {
    games: RwLock<HashMap<GroupId, Arc<Mutex<GameState>>>>,
    store: Arc<dyn GameStore>,
}

impl GameRegistry {
    pub fn new(store: Arc<dyn GameStore>) -> Self {
        GameRegistry {
            games: RwLock::new(HashMap::new()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn GameStore> {
        &self.store
    }

    /// Existing state for the group, or a fresh inactive one. Creation alone
    /// is not persisted; the store only learns about a group on its first
    /// mutation.
    pub async fn get(&self, group_id: GroupId) -> Arc<Mutex<GameState>> {
        {
            let games = self.games.read().await;
            if let Some(game) = games.get(&group_id) {
                return Arc::clone(game);
            }
        }
        let mut games = self.games.write().await;
        Arc::clone(
            games
                .entry(group_id)
                .or_insert_with(|| Arc::new(Mutex::new(GameState::new(group_id)))),
        )
    }

    /// Snapshot of all live entries, taken once per scheduler tick.
    pub async fn games_snapshot(&self) -> Vec<(GroupId, Arc<Mutex<GameState>>)> {
        self.games
            .read()
            .await
            .iter()
            .map(|(group_id, game)| (*group_id, Arc::clone(game)))
            .collect()
    }

    /// Start a fresh game bound to a broadcast channel, wiping any previous
    /// game the group had (including its persisted records).
    pub async fn start_game(&self, group_id: GroupId, channel: ChannelId) {
        log_write_failure(group_id, "delete_group", self.store.delete_group(group_id).await);

        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        *state = GameState::new(group_id);
        state.begin(channel);
        log_write_failure(group_id, "save_game", self.store.save_game(&state).await);
    }

    /// Set or overwrite the voter's entry. Player validity is the command
    /// surface's concern, not checked here.
    pub async fn cast_vote(&self, group_id: GroupId, voter: PlayerId, target: PlayerId) {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        state.cast_vote(voter, target);
        log_write_failure(
            group_id,
            "save_vote",
            self.store.save_vote(group_id, voter, target).await,
        );
    }

    /// Remove the voter's entry. Returns whether a vote existed; when it
    /// does not, nothing is mutated or written.
    pub async fn remove_vote(&self, group_id: GroupId, voter: PlayerId) -> bool {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        if !state.remove_vote(voter) {
            return false;
        }
        log_write_failure(
            group_id,
            "remove_vote",
            self.store.remove_vote(group_id, voter).await,
        );
        true
    }

    /// Eliminate a player and purge all votes involving them, mirroring the
    /// elimination and each vote deletion.
    pub async fn eliminate(&self, group_id: GroupId, player: PlayerId) {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        let purged = state.eliminate(player);
        self.persist_elimination(group_id, player, &purged).await;
    }

    /// Begin the hammer countdown for the group.
    pub async fn start_countdown(&self, group_id: GroupId, duration: TimeDelta, channel: ChannelId) {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        state.start_countdown(Utc::now(), duration, channel);
        log_write_failure(group_id, "save_game", self.store.save_game(&state).await);
    }

    /// Wipe all votes and stop the countdown, keeping the game (and its
    /// eliminations) running.
    pub async fn clear_votes(&self, group_id: GroupId) {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        state.clear_votes();
        state.clear_countdown();
        log_write_failure(group_id, "clear_votes", self.store.clear_votes(group_id).await);
        log_write_failure(
            group_id,
            "update_countdown",
            self.store.update_countdown(group_id, None).await,
        );
    }

    /// Destroy the group's game entirely: fresh in-memory state, persisted
    /// records deleted.
    pub async fn reset(&self, group_id: GroupId) {
        let game = self.get(group_id).await;
        let mut state = game.lock().await;
        *state = GameState::new(group_id);
        log_write_failure(group_id, "delete_group", self.store.delete_group(group_id).await);
    }

    /// First target holding a majority of the active players' votes, if any.
    pub async fn check_majority(
        &self,
        group_id: GroupId,
        roster: &dyn Roster,
    ) -> Result<Option<PlayerId>, PlatformError> {
        let players = roster.active_players(group_id).await?;
        let game = self.get(group_id).await;
        let state = game.lock().await;
        Ok(tally::check_majority(&state, &players))
    }

    /// Replace the whole in-memory map with the store's contents. Runs once
    /// at startup, before the scheduler starts ticking; a failure leaves the
    /// process unable to start safely and is propagated as fatal.
    pub async fn load_all(&self) -> StoreResult<usize> {
        let loaded = self.store.load_all().await?;
        let count = loaded.len();
        let mut games = self.games.write().await;
        *games = loaded
            .into_iter()
            .map(|(group_id, state)| (group_id, Arc::new(Mutex::new(state))))
            .collect();
        Ok(count)
    }

    /// Mirror an already-applied elimination. Also used by the scheduler,
    /// which applies the state change itself while holding the group lock.
    pub(crate) async fn persist_elimination(
        &self,
        group_id: GroupId,
        player: PlayerId,
        purged_voters: &[PlayerId],
    ) {
        log_write_failure(
            group_id,
            "save_elimination",
            self.store.save_elimination(group_id, player).await,
        );
        for voter in purged_voters {
            log_write_failure(
                group_id,
                "remove_vote",
                self.store.remove_vote(group_id, *voter).await,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ChannelRef;
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FixedRoster(Vec<PlayerId>);

    #[async_trait]
    impl Roster for FixedRoster {
        async fn active_players(&self, _group_id: GroupId) -> Result<Vec<PlayerId>, PlatformError> {
            Ok(self.0.clone())
        }
    }

    fn registry() -> (Arc<MemoryStore>, GameRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = GameRegistry::new(store.clone() as Arc<dyn GameStore>);
        (store, registry)
    }

    #[tokio::test]
    async fn lazy_creation_persists_nothing() {
        let (store, registry) = registry();
        let _ = registry.get(GroupId(1)).await;
        assert!(!store.contains(GroupId(1)).await);
    }

    #[tokio::test]
    async fn mutations_are_mirrored_to_the_store() {
        let (store, registry) = registry();
        registry.start_game(GroupId(1), ChannelId(9)).await;
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;
        registry.cast_vote(GroupId(1), PlayerId(4), PlayerId(3)).await;
        registry.eliminate(GroupId(1), PlayerId(4)).await;

        let loaded = store.load_all().await.unwrap();
        let restored = loaded.get(&GroupId(1)).unwrap();
        assert!(restored.is_active());
        assert_eq!(restored.votes().len(), 1);
        assert_eq!(restored.votes().get(&PlayerId(2)), Some(&PlayerId(3)));
        assert!(restored.is_eliminated(PlayerId(4)));
    }

    #[tokio::test]
    async fn remove_vote_reports_and_skips_missing_votes() {
        let (_, registry) = registry();
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;
        assert!(registry.remove_vote(GroupId(1), PlayerId(2)).await);
        assert!(!registry.remove_vote(GroupId(1), PlayerId(2)).await);
    }

    #[tokio::test]
    async fn reset_clears_memory_and_store() {
        let (store, registry) = registry();
        registry.start_game(GroupId(1), ChannelId(9)).await;
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;

        registry.reset(GroupId(1)).await;

        let game = registry.get(GroupId(1)).await;
        let state = game.lock().await;
        assert!(!state.is_active());
        assert!(state.votes().is_empty());
        drop(state);
        assert!(!store.contains(GroupId(1)).await);
    }

    #[tokio::test]
    async fn clear_votes_keeps_eliminations_and_stops_countdown() {
        let (store, registry) = registry();
        registry.start_game(GroupId(1), ChannelId(9)).await;
        registry.eliminate(GroupId(1), PlayerId(7)).await;
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;
        registry
            .start_countdown(GroupId(1), TimeDelta::hours(24), ChannelId(9))
            .await;

        registry.clear_votes(GroupId(1)).await;

        let game = registry.get(GroupId(1)).await;
        let state = game.lock().await;
        assert!(state.votes().is_empty());
        assert_eq!(state.countdown(), None);
        assert!(state.is_eliminated(PlayerId(7)));
        drop(state);

        let restored = store.load_all().await.unwrap();
        let restored = restored.get(&GroupId(1)).unwrap();
        assert!(restored.votes().is_empty());
        assert_eq!(restored.countdown(), None);
        assert!(restored.is_eliminated(PlayerId(7)));
    }

    #[tokio::test]
    async fn check_majority_uses_the_live_roster() {
        let (_, registry) = registry();
        registry.start_game(GroupId(1), ChannelId(9)).await;
        registry.cast_vote(GroupId(1), PlayerId(1), PlayerId(3)).await;
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;
        registry.cast_vote(GroupId(1), PlayerId(4), PlayerId(3)).await;

        let roster = FixedRoster((1..=5).map(PlayerId).collect());
        assert_eq!(
            registry.check_majority(GroupId(1), &roster).await.unwrap(),
            Some(PlayerId(3))
        );

        let tight_roster = FixedRoster((1..=7).map(PlayerId).collect());
        assert_eq!(
            registry.check_majority(GroupId(1), &tight_roster).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn load_all_replaces_the_whole_map() {
        let (store, registry) = registry();
        registry.start_game(GroupId(1), ChannelId(9)).await;
        registry
            .start_countdown(GroupId(1), TimeDelta::hours(24), ChannelId(9))
            .await;
        registry.cast_vote(GroupId(1), PlayerId(2), PlayerId(3)).await;

        // A second registry over the same store, as after a restart.
        let rebooted = GameRegistry::new(store.clone() as Arc<dyn GameStore>);
        assert_eq!(rebooted.load_all().await.unwrap(), 1);

        let game = rebooted.get(GroupId(1)).await;
        let state = game.lock().await;
        assert!(state.is_active());
        assert_eq!(state.votes().get(&PlayerId(2)), Some(&PlayerId(3)));
        assert!(state.countdown().is_some());
        assert_eq!(state.channel(), ChannelRef::Unresolved(ChannelId(9)));
    }
}

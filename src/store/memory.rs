//! In-memory [`GameStore`] mirror.
//!
//! Keeps the same three logical records per group as the SQLite backend and
//! the same edge-case behavior (countdown updates on a missing metadata row
//! are no-ops, votes without a metadata row are dropped on reload). Used as
//! the substitute backend in tests.

use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::Mutex;

use crate::game::{ChannelId, Countdown, GameState, GroupId, PlayerId};
use crate::store::{GameStore, StoreResult};

#[derive(Debug, Clone, Copy)]
struct GameMeta {
    active: bool,
    channel: Option<ChannelId>,
    countdown: Option<Countdown>,
}

#[derive(Debug, Default)]
struct GroupRecord {
    meta: Option<GameMeta>,
    votes: IndexMap<PlayerId, PlayerId>,
    eliminated: BTreeSet<PlayerId>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: Mutex<HashMap<GroupId, GroupRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any record at all exists for the group. Test probe.
    pub async fn contains(&self, group_id: GroupId) -> bool {
        self.groups.lock().await.contains_key(&group_id)
    }
}

#[async_trait]
impl GameStore for MemoryStore {
    async fn save_game(&self, state: &GameState) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        let record = groups.entry(state.group_id()).or_default();
        record.meta = Some(GameMeta {
            active: state.is_active(),
            channel: state.channel().id(),
            countdown: state.countdown().copied(),
        });
        Ok(())
    }

    async fn update_countdown(
        &self,
        group_id: GroupId,
        countdown: Option<&Countdown>,
    ) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        if let Some(meta) = groups.get_mut(&group_id).and_then(|r| r.meta.as_mut()) {
            meta.countdown = countdown.copied();
        }
        Ok(())
    }

    async fn save_vote(
        &self,
        group_id: GroupId,
        voter: PlayerId,
        target: PlayerId,
    ) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        groups.entry(group_id).or_default().votes.insert(voter, target);
        Ok(())
    }

    async fn remove_vote(&self, group_id: GroupId, voter: PlayerId) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        if let Some(record) = groups.get_mut(&group_id) {
            record.votes.shift_remove(&voter);
        }
        Ok(())
    }

    async fn clear_votes(&self, group_id: GroupId) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        if let Some(record) = groups.get_mut(&group_id) {
            record.votes.clear();
        }
        Ok(())
    }

    async fn save_elimination(&self, group_id: GroupId, player: PlayerId) -> StoreResult<()> {
        let mut groups = self.groups.lock().await;
        groups.entry(group_id).or_default().eliminated.insert(player);
        Ok(())
    }

    async fn delete_group(&self, group_id: GroupId) -> StoreResult<()> {
        self.groups.lock().await.remove(&group_id);
        Ok(())
    }

    async fn load_all(&self) -> StoreResult<HashMap<GroupId, GameState>> {
        let groups = self.groups.lock().await;
        let mut games = HashMap::new();
        for (group_id, record) in groups.iter() {
            // Vote and elimination rows without a metadata row belong to no
            // reconstructable game.
            let Some(meta) = record.meta else { continue };
            games.insert(
                *group_id,
                GameState::restore(
                    *group_id,
                    meta.active,
                    meta.channel,
                    meta.countdown,
                    record.votes.clone(),
                    record.eliminated.clone(),
                ),
            );
        }
        Ok(games)
    }
}

//! Durable mirror of every game mutation, keyed by group id.
//!
//! The in-memory registry stays authoritative while the process is alive; the
//! store exists so a restart can rebuild the same state. Three logical records
//! per group: game metadata, the vote set, and the eliminated set.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::game::{Countdown, GameState, GroupId, PlayerId};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record for group {group_id}: {message}")]
    Corrupt { group_id: i64, message: String },
}

/// Storage capability set injected into the registry and scheduler, so tests
/// can substitute the in-memory mirror for the SQLite backend.
///
/// Each operation covers one logical record and must be atomic on its own;
/// no cross-group or cross-record transactions are needed.
#[async_trait]
pub trait GameStore: Send + Sync {
    /// Upsert the game metadata row (active flag, channel, countdown fields).
    async fn save_game(&self, state: &GameState) -> StoreResult<()>;

    /// Overwrite just the countdown fields of an existing metadata row.
    async fn update_countdown(
        &self,
        group_id: GroupId,
        countdown: Option<&Countdown>,
    ) -> StoreResult<()>;

    /// Upsert a single vote.
    async fn save_vote(
        &self,
        group_id: GroupId,
        voter: PlayerId,
        target: PlayerId,
    ) -> StoreResult<()>;

    /// Delete a single vote if present.
    async fn remove_vote(&self, group_id: GroupId, voter: PlayerId) -> StoreResult<()>;

    /// Drop every vote for the group.
    async fn clear_votes(&self, group_id: GroupId) -> StoreResult<()>;

    /// Record an elimination.
    async fn save_elimination(&self, group_id: GroupId, player: PlayerId) -> StoreResult<()>;

    /// Delete all three records for the group.
    async fn delete_group(&self, group_id: GroupId) -> StoreResult<()>;

    /// Rebuild every persisted game. Invoked once at startup, before the
    /// scheduler ticks; a failure here aborts the process.
    async fn load_all(&self) -> StoreResult<HashMap<GroupId, GameState>>;
}

/// Write failures never interrupt a mutation: the in-memory state is
/// authoritative and the next successful write catches the store up.
pub(crate) fn log_write_failure(group_id: GroupId, op: &'static str, result: StoreResult<()>) {
    if let Err(error) = result {
        tracing::warn!(
            group.id = %group_id,
            store.op = op,
            error = %error,
            "Store write failed; in-memory state remains authoritative"
        );
    }
}

//! SQLite [`GameStore`] backend.
//!
//! One small database file per deployment; three tables matching the three
//! logical records. Every write is a single statement, which gives the
//! per-record atomicity the registry relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use crate::game::{ChannelId, Countdown, GameState, GroupId, PlayerId};
use crate::store::{GameStore, StoreError, StoreResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at the given sqlx URL, e.g.
    /// `sqlite://hammaren.db` or `sqlite::memory:`, and ensure the schema.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        // A single connection serializes all writes and keeps `:memory:`
        // databases from splitting across pool connections.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS games (
                group_id INTEGER PRIMARY KEY,
                channel_id INTEGER,
                active INTEGER NOT NULL,
                countdown_active INTEGER NOT NULL,
                countdown_ends_at TEXT,
                last_broadcast_at TEXT
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS votes (
                group_id INTEGER NOT NULL,
                voter_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                PRIMARY KEY (group_id, voter_id)
            )",
        )
        .execute(&pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS eliminated (
                group_id INTEGER NOT NULL,
                player_id INTEGER NOT NULL,
                PRIMARY KEY (group_id, player_id)
            )",
        )
        .execute(&pool)
        .await?;

        Ok(SqliteStore { pool })
    }
}

#[async_trait]
impl GameStore for SqliteStore {
    async fn save_game(&self, state: &GameState) -> StoreResult<()> {
        let countdown = state.countdown();
        sqlx::query(
            "INSERT OR REPLACE INTO games
             (group_id, channel_id, active, countdown_active, countdown_ends_at, last_broadcast_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(state.group_id().0)
        .bind(state.channel().id().map(|c| c.0))
        .bind(state.is_active() as i64)
        .bind(countdown.is_some() as i64)
        .bind(countdown.map(|c| c.ends_at.to_rfc3339()))
        .bind(countdown.map(|c| c.last_broadcast_at.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_countdown(
        &self,
        group_id: GroupId,
        countdown: Option<&Countdown>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE games
             SET countdown_active = ?, countdown_ends_at = ?, last_broadcast_at = ?
             WHERE group_id = ?",
        )
        .bind(countdown.is_some() as i64)
        .bind(countdown.map(|c| c.ends_at.to_rfc3339()))
        .bind(countdown.map(|c| c.last_broadcast_at.to_rfc3339()))
        .bind(group_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_vote(
        &self,
        group_id: GroupId,
        voter: PlayerId,
        target: PlayerId,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO votes (group_id, voter_id, target_id) VALUES (?, ?, ?)",
        )
        .bind(group_id.0)
        .bind(voter.0)
        .bind(target.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_vote(&self, group_id: GroupId, voter: PlayerId) -> StoreResult<()> {
        sqlx::query("DELETE FROM votes WHERE group_id = ? AND voter_id = ?")
            .bind(group_id.0)
            .bind(voter.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_votes(&self, group_id: GroupId) -> StoreResult<()> {
        sqlx::query("DELETE FROM votes WHERE group_id = ?")
            .bind(group_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_elimination(&self, group_id: GroupId, player: PlayerId) -> StoreResult<()> {
        sqlx::query("INSERT OR IGNORE INTO eliminated (group_id, player_id) VALUES (?, ?)")
            .bind(group_id.0)
            .bind(player.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_group(&self, group_id: GroupId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["games", "votes", "eliminated"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE group_id = ?"))
                .bind(group_id.0)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_all(&self) -> StoreResult<HashMap<GroupId, GameState>> {
        let mut votes: HashMap<GroupId, IndexMap<PlayerId, PlayerId>> = HashMap::new();
        // rowid order reproduces a deterministic vote order after restart.
        let vote_rows = sqlx::query(
            "SELECT group_id, voter_id, target_id FROM votes ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in vote_rows {
            votes
                .entry(GroupId(row.try_get("group_id")?))
                .or_default()
                .insert(
                    PlayerId(row.try_get("voter_id")?),
                    PlayerId(row.try_get("target_id")?),
                );
        }

        let mut eliminated: HashMap<GroupId, BTreeSet<PlayerId>> = HashMap::new();
        let elimination_rows = sqlx::query("SELECT group_id, player_id FROM eliminated")
            .fetch_all(&self.pool)
            .await?;
        for row in elimination_rows {
            eliminated
                .entry(GroupId(row.try_get("group_id")?))
                .or_default()
                .insert(PlayerId(row.try_get("player_id")?));
        }

        let mut games = HashMap::new();
        let game_rows = sqlx::query(
            "SELECT group_id, channel_id, active, countdown_active,
                    countdown_ends_at, last_broadcast_at
             FROM games",
        )
        .fetch_all(&self.pool)
        .await?;
        for row in game_rows {
            let group_id = GroupId(row.try_get("group_id")?);
            let countdown = if row.try_get::<i64, _>("countdown_active")? != 0 {
                Some(Countdown {
                    ends_at: required_timestamp(
                        group_id,
                        "countdown_ends_at",
                        row.try_get("countdown_ends_at")?,
                    )?,
                    last_broadcast_at: required_timestamp(
                        group_id,
                        "last_broadcast_at",
                        row.try_get("last_broadcast_at")?,
                    )?,
                })
            } else {
                None
            };
            games.insert(
                group_id,
                GameState::restore(
                    group_id,
                    row.try_get::<i64, _>("active")? != 0,
                    row.try_get::<Option<i64>, _>("channel_id")?.map(ChannelId),
                    countdown,
                    votes.remove(&group_id).unwrap_or_default(),
                    eliminated.remove(&group_id).unwrap_or_default(),
                ),
            );
        }

        // Whatever remains in `votes`/`eliminated` has no metadata row and
        // belongs to no reconstructable game.
        Ok(games)
    }
}

fn required_timestamp(
    group_id: GroupId,
    column: &str,
    value: Option<String>,
) -> StoreResult<DateTime<Utc>> {
    let raw = value.ok_or_else(|| StoreError::Corrupt {
        group_id: group_id.0,
        message: format!("{column} missing while countdown is marked active"),
    })?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| StoreError::Corrupt {
            group_id: group_id.0,
            message: format!("unparseable {column}: {error}"),
        })
}

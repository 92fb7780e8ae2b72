//! Periodic countdown driver.
//!
//! One tick scans every registered game: expired countdowns are resolved
//! (top-voted player eliminated, one expiry broadcast), running ones get a
//! status broadcast every four hours. Ticks never overlap: a tick runs to
//! completion, including broadcast deliveries, before the next one starts,
//! and an overrunning tick only delays its successor.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

use crate::game::tally::{self, TallySnapshot};
use crate::game::{ChannelId, ChannelRef, GameState, GroupId};
use crate::platform::{BroadcastEvent, BroadcastKind, Broadcaster, PlatformError, TallyEntry};
use crate::registry::GameRegistry;
use crate::store::log_write_failure;

pub struct CountdownScheduler {
    registry: Arc<GameRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    tick_interval: Duration,
    broadcast_interval: TimeDelta,
}

impl CountdownScheduler {
    pub fn new(
        registry: Arc<GameRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        tick_interval: Duration,
        broadcast_interval: TimeDelta,
    ) -> Self {
        CountdownScheduler {
            registry,
            broadcaster,
            tick_interval,
            broadcast_interval,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        tracing::info!(
            tick.interval_secs = self.tick_interval.as_secs(),
            "Countdown scheduler started"
        );
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_tick(Utc::now()).await;
        }
    }

    /// One full pass over the registry. A failure in one group never aborts
    /// the others.
    pub async fn run_tick(&self, now: DateTime<Utc>) {
        for (group_id, game) in self.registry.games_snapshot().await {
            if let Err(error) = self.tick_group(group_id, &game, now).await {
                tracing::warn!(
                    group.id = %group_id,
                    error = %error,
                    "Countdown tick failed for group; continuing with the rest"
                );
            }
        }
    }

    async fn tick_group(
        &self,
        group_id: GroupId,
        game: &Arc<Mutex<GameState>>,
        now: DateTime<Utc>,
    ) -> Result<(), PlatformError> {
        let mut state = game.lock().await;
        let Some(countdown) = state.countdown().copied() else {
            return Ok(());
        };

        let channel_id = match state.channel() {
            ChannelRef::Resolved(id) => id,
            ChannelRef::Unresolved(id) => {
                match self.broadcaster.resolve_channel(group_id, id).await? {
                    Some(confirmed) => {
                        state.resolve_channel();
                        confirmed
                    }
                    None => {
                        tracing::debug!(
                            group.id = %group_id,
                            channel.id = %id,
                            "Broadcast channel not resolvable yet; skipping group this tick"
                        );
                        return Ok(());
                    }
                }
            }
            ChannelRef::Unset => {
                tracing::debug!(
                    group.id = %group_id,
                    "Countdown running without a broadcast channel; skipping group"
                );
                return Ok(());
            }
        };

        if state.is_expired(now) {
            let event = self.resolve_expiry(group_id, channel_id, &mut state).await;
            drop(state);
            return self.broadcaster.send(event).await;
        }

        if now - countdown.last_broadcast_at < self.broadcast_interval {
            return Ok(());
        }

        if let Some(updated) = state.mark_broadcast(now) {
            log_write_failure(
                group_id,
                "update_countdown",
                self.registry
                    .store()
                    .update_countdown(group_id, Some(&updated))
                    .await,
            );
        }
        let remaining = state
            .time_remaining(now)
            .unwrap_or_else(TimeDelta::zero)
            .num_seconds();
        let event = BroadcastEvent {
            group_id,
            channel_id,
            kind: BroadcastKind::PeriodicUpdate {
                remaining_secs: remaining,
            },
            tally: tally_entries(&tally::tally(&state)),
        };
        drop(state);
        self.broadcaster.send(event).await
    }

    /// Close out an expired countdown: stop it, eliminate the top-voted
    /// player (if anyone voted), and build the single expiry broadcast with
    /// the final tally.
    async fn resolve_expiry(
        &self,
        group_id: GroupId,
        channel_id: ChannelId,
        state: &mut GameState,
    ) -> BroadcastEvent {
        state.clear_countdown();
        log_write_failure(
            group_id,
            "update_countdown",
            self.registry.store().update_countdown(group_id, None).await,
        );

        let counts = tally::tally(state);
        let snapshot = tally_entries(&counts);
        let eliminated = tally::top_target(&counts);
        match eliminated {
            Some(player) => {
                let purged = state.eliminate(player);
                self.registry
                    .persist_elimination(group_id, player, &purged)
                    .await;
                tracing::info!(
                    group.id = %group_id,
                    player.id = %player,
                    "Hammer expired; top-voted player eliminated"
                );
            }
            None => {
                tracing::info!(
                    group.id = %group_id,
                    "Hammer expired with no votes; nobody eliminated"
                );
            }
        }

        BroadcastEvent {
            group_id,
            channel_id,
            kind: BroadcastKind::Expiry { eliminated },
            tally: snapshot,
        }
    }
}

fn tally_entries(counts: &TallySnapshot) -> Vec<TallyEntry> {
    counts
        .iter()
        .map(|(target, voters)| TallyEntry {
            target: *target,
            voters: voters.clone(),
        })
        .collect()
}

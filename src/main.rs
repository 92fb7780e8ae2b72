// src/main.rs

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hammaren::config::load_settings;
use hammaren::error::Result as AppResult;
use hammaren::platform::{Broadcaster, LogBroadcaster};
use hammaren::registry::GameRegistry;
use hammaren::scheduler::CountdownScheduler;
use hammaren::store::{GameStore, SqliteStore};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Setup tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info,sqlx=warn", env!("CARGO_PKG_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load Configuration
    let app_settings = load_settings()?;
    tracing::info!("Configuration loaded: {:?}", app_settings);

    // Open the store and rebuild every persisted game before anything ticks.
    // A reload failure is fatal: starting with partial state is worse than
    // not starting.
    let store = Arc::new(SqliteStore::connect(&app_settings.database.url).await?);
    let registry = Arc::new(GameRegistry::new(
        Arc::clone(&store) as Arc<dyn GameStore>
    ));
    let restored = registry.load_all().await?;
    tracing::info!(games = restored, "Restored game state from database");

    // Without a chat platform attached, broadcasts go to the log.
    let broadcaster = Arc::new(LogBroadcaster) as Arc<dyn Broadcaster>;
    let scheduler = CountdownScheduler::new(
        Arc::clone(&registry),
        broadcaster,
        app_settings.countdown.tick_interval(),
        app_settings.countdown.broadcast_interval(),
    );
    let scheduler_task = scheduler.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received; stopping scheduler");
    scheduler_task.abort();

    Ok(())
}

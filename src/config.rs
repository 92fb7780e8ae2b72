use crate::error::{ConfigError, Result as AppResult};
use chrono::TimeDelta;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// sqlx SQLite URL, e.g. `sqlite://hammaren.db`.
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CountdownConfig {
    /// Default hammer length handed to `start_countdown` by the command surface.
    pub duration_hours: i64,
    /// Cadence of periodic status broadcasts while a countdown runs.
    pub broadcast_interval_hours: i64,
    /// Scheduler tick interval.
    pub tick_interval_secs: u64,
}

impl CountdownConfig {
    pub fn duration(&self) -> TimeDelta {
        TimeDelta::hours(self.duration_hours)
    }

    pub fn broadcast_interval(&self) -> TimeDelta {
        TimeDelta::hours(self.broadcast_interval_hours)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct AppSettings {
    pub database: DatabaseConfig,
    pub countdown: CountdownConfig,
}

pub fn load_settings() -> AppResult<AppSettings> {
    let builder = Config::builder()
        .add_source(
            Environment::with_prefix("HAMMAREN")
                .separator("__")
                .try_parsing(true),
        )
        .add_source(File::with_name("config").required(false))
        .set_default("database.url", "sqlite://hammaren.db")
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .set_default("countdown.duration_hours", 24)
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .set_default("countdown.broadcast_interval_hours", 4)
        .map_err(|e| ConfigError::Load(e.to_string()))?
        .set_default("countdown.tick_interval_secs", 60)
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings = builder
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let settings: AppSettings = settings
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    if settings.countdown.duration_hours <= 0 {
        return Err(ConfigError::InvalidValue(
            "countdown.duration_hours must be positive".to_string(),
        )
        .into());
    }
    if settings.countdown.broadcast_interval_hours <= 0 {
        return Err(ConfigError::InvalidValue(
            "countdown.broadcast_interval_hours must be positive".to_string(),
        )
        .into());
    }
    if settings.countdown.tick_interval_secs == 0 {
        return Err(ConfigError::InvalidValue(
            "countdown.tick_interval_secs must be positive".to_string(),
        )
        .into());
    }

    Ok(settings)
}

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Engine defaults — overridable via tempo.toml / TEMPO_* env vars.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_LEASE_SECS: u64 = 300;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_DEAD_LETTER_THRESHOLD: u32 = 5;
pub const DEFAULT_MAX_JOBS_PER_TICK: usize = 500;

/// Top-level config (tempo.toml + TEMPO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Passed to `PRAGMA busy_timeout` so concurrent writers queue at the
    /// driver instead of erroring.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Lease duration handed to workers that do not ask for their own.
    #[serde(default = "default_lease_secs")]
    pub default_lease_secs: u64,
    /// Consecutive-failure threshold applied to jobs created without one.
    #[serde(default = "default_dead_letter_threshold")]
    pub dead_letter_threshold: u32,
    /// Cap on due jobs processed per tick; the rest wait for the next tick.
    #[serde(default = "default_max_jobs_per_tick")]
    pub max_jobs_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            default_lease_secs: DEFAULT_LEASE_SECS,
            dead_letter_threshold: DEFAULT_DEAD_LETTER_THRESHOLD,
            max_jobs_per_tick: DEFAULT_MAX_JOBS_PER_TICK,
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tempo/tempo.db")
}

fn default_busy_timeout() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_tick_interval() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_lease_secs() -> u64 {
    DEFAULT_LEASE_SECS
}

fn default_dead_letter_threshold() -> u32 {
    DEFAULT_DEAD_LETTER_THRESHOLD
}

fn default_max_jobs_per_tick() -> usize {
    DEFAULT_MAX_JOBS_PER_TICK
}

impl TempoConfig {
    /// Load config from a TOML file with TEMPO_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.tempo/tempo.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TempoConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TEMPO_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.tempo/tempo.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TempoConfig::default();
        assert_eq!(cfg.engine.tick_interval_secs, 1);
        assert!(cfg.engine.default_lease_secs >= 60);
        assert!(cfg.engine.dead_letter_threshold > 0);
        assert!(cfg.database.path.ends_with("tempo.db"));
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,
    pub min_queue_depth: usize,
    pub max_consecutive_failures: u32,

    // Tiempos (segundos salvo indicación)
    pub alone_timeout: u64,
    pub alone_tick: u64,
    pub disconnect_grace_ms: u64,
    pub library_refresh: u64,

    // Paths
    pub songs_dir: PathBuf,
    pub data_dir: PathBuf,

    // Semilla opcional para el relleno aleatorio
    pub random_seed: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            // Audio
            default_volume: env_or("DEFAULT_VOLUME", defaults.default_volume)?,
            max_queue_size: env_or("MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            min_queue_depth: env_or("MIN_QUEUE_DEPTH", defaults.min_queue_depth)?,
            max_consecutive_failures: env_or(
                "MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            )?,

            // Tiempos
            alone_timeout: env_or("ALONE_TIMEOUT", defaults.alone_timeout)?,
            alone_tick: env_or("ALONE_TICK", defaults.alone_tick)?,
            disconnect_grace_ms: env_or("DISCONNECT_GRACE_MS", defaults.disconnect_grace_ms)?,
            library_refresh: env_or("LIBRARY_REFRESH", defaults.library_refresh)?,

            // Paths
            songs_dir: std::env::var("SONGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.songs_dir),
            data_dir: std::env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),

            random_seed: match std::env::var("RANDOM_SEED") {
                Ok(val) if !val.trim().is_empty() => Some(val.trim().parse()?),
                _ => None,
            },
        };

        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 2.0
    /// - Queue limits and minimum depth must be > 0
    /// - The alone countdown tick must not exceed the alone timeout
    pub fn validate(&self) -> Result<()> {
        if self.default_volume < 0.0 || self.default_volume > 2.0 {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.min_queue_depth == 0 {
            anyhow::bail!("Min queue depth must be greater than 0");
        }

        if self.max_consecutive_failures == 0 {
            anyhow::bail!("Max consecutive failures must be greater than 0");
        }

        if self.alone_timeout == 0 {
            anyhow::bail!("Alone timeout must be greater than 0");
        }

        if self.alone_tick == 0 || self.alone_tick > self.alone_timeout {
            anyhow::bail!(
                "Alone tick must be between 1 and the alone timeout ({}s), got: {}",
                self.alone_timeout,
                self.alone_tick
            );
        }

        Ok(())
    }

    pub fn alone_timeout(&self) -> Duration {
        Duration::from_secs(self.alone_timeout)
    }

    pub fn alone_tick(&self) -> Duration {
        Duration::from_secs(self.alone_tick)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn library_refresh(&self) -> Duration {
        Duration::from_secs(self.library_refresh)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Library: {} (refresh {})\n  \
            Audio: {}% vol, queue {} max, {} min depth\n  \
            Alone: timeout {}, tick {}, grace {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.songs_dir.display(),
            humantime::format_duration(self.library_refresh()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            self.min_queue_depth,
            humantime::format_duration(self.alone_timeout()),
            humantime::format_duration(self.alone_tick()),
            humantime::format_duration(self.disconnect_grace()),
        )
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => Ok(val.trim().parse()?),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 0.5,
            max_queue_size: 100,
            min_queue_depth: 3,
            max_consecutive_failures: 5,

            // Timing defaults
            alone_timeout: 300,     // 5 minutos
            alone_tick: 15,
            disconnect_grace_ms: 1000,
            library_refresh: 300,   // 5 minutos

            // Path defaults
            songs_dir: "./songs".into(),
            data_dir: "./data".into(),

            random_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.default_volume = 3.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alone_tick = config.alone_timeout + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.min_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let mut config = Config::default();
        config.discord_token = "super-secreto".into();
        let summary = config.summary();
        assert!(!summary.contains("super-secreto"));
        assert!(summary.contains("5m"));
    }
}

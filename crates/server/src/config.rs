//! Server configuration.

use protocol::packets::MapUpdate;
use protocol::MAX_PAYLOAD_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Highest slot count whose cell code (`10 + slot`) still fits in a byte.
pub const MAX_PLAYER_SLOTS: usize = 245;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("failed to write default config: {0}")]
    Write(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from `path`, writing the defaults there if it does not exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            let text = toml::to_string_pretty(&default_config)
                .map_err(|e| ConfigError::Write(e.to_string()))?;
            std::fs::write(path, text).map_err(|e| ConfigError::Write(e.to_string()))?;
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.server.workers == 0 {
            return invalid("server.workers must be at least 1");
        }
        if self.server.tick_interval_ms == 0 {
            return invalid("server.tick_interval_ms must be positive");
        }
        if self.server.max_connections_per_worker == 0 {
            return invalid("server.max_connections_per_worker must be at least 1");
        }
        if self.grid.width < 3 || self.grid.height < 3 {
            return invalid("grid must be at least 3x3");
        }
        if self.limits.max_players == 0 || self.limits.max_players > MAX_PLAYER_SLOTS {
            return Err(ConfigError::Invalid(format!(
                "limits.max_players must be within 1..={}",
                MAX_PLAYER_SLOTS
            )));
        }
        let snapshot_len = MapUpdate::wire_len(
            usize::from(self.grid.width),
            usize::from(self.grid.height),
            self.limits.max_players,
        );
        if snapshot_len > MAX_PAYLOAD_SIZE as usize {
            return Err(ConfigError::Invalid(format!(
                "a {}x{} grid with {} players makes a {} byte map update, over the {} byte frame limit",
                self.grid.width,
                self.grid.height,
                self.limits.max_players,
                snapshot_len,
                MAX_PAYLOAD_SIZE
            )));
        }
        if self.limits.max_snake_len < 3 {
            return invalid("limits.max_snake_len must be at least 3");
        }
        if self.limits.max_food == 0 || self.limits.chat_history == 0 {
            return invalid("limits.max_food and limits.chat_history must be positive");
        }
        Ok(())
    }
}

/// Listener and scheduling settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of connection workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Simulation tick interval in milliseconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Connection table size of each worker.
    #[serde(default = "default_max_connections_per_worker")]
    pub max_connections_per_worker: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            workers: default_workers(),
            tick_interval_ms: default_tick_interval(),
            max_connections_per_worker: default_max_connections_per_worker(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8888
}
fn default_workers() -> usize {
    4
}
fn default_tick_interval() -> u64 {
    100
}
fn default_max_connections_per_worker() -> usize {
    256
}

/// Grid dimensions, border included.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_size")]
    pub width: u16,
    #[serde(default = "default_grid_size")]
    pub height: u16,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_size(),
            height: default_grid_size(),
        }
    }
}

fn default_grid_size() -> u16 {
    50
}

/// Capacity limits of the shared state.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default = "default_max_snake_len")]
    pub max_snake_len: usize,
    #[serde(default = "default_max_food")]
    pub max_food: usize,
    #[serde(default = "default_chat_history")]
    pub chat_history: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            max_snake_len: default_max_snake_len(),
            max_food: default_max_food(),
            chat_history: default_chat_history(),
        }
    }
}

fn default_max_players() -> usize {
    100
}
fn default_max_snake_len() -> usize {
    200
}
fn default_max_food() -> usize {
    20
}
fn default_chat_history() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8888);
        assert_eq!(config.grid.width, 50);
        assert_eq!(config.limits.chat_history, 50);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            workers = 2

            [grid]
            width = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.server.workers, 2);
        assert_eq!(config.server.tick_interval_ms, 100);
        assert_eq!(config.grid.width, 30);
        assert_eq!(config.grid.height, 50);
        assert_eq!(config.limits.max_food, 20);
    }

    #[test]
    fn test_rejects_unrunnable_values() {
        let mut config = Config::default();
        config.server.workers = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.limits.max_players = MAX_PLAYER_SLOTS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.grid.height = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_grid_whose_snapshot_exceeds_frame_limit() {
        let mut config = Config::default();
        config.grid.width = 300;
        config.grid.height = 300;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        // 250 * 250 + 10 + 100 * 22 = 64710 still fits.
        config.grid.width = 250;
        config.grid.height = 250;
        assert!(config.validate().is_ok());

        // The slot table counts too: 245 * 22 pushes it over.
        config.limits.max_players = MAX_PLAYER_SLOTS;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.grid.width = u16::MAX;
        config.grid.height = u16::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_writes_default_file() {
        let path = std::env::temp_dir().join(format!("snakepit-config-{}.toml", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.server.port, config.server.port);

        std::fs::remove_file(&path).unwrap();
    }
}

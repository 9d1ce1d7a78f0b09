//! Configuration
//!
//! [`GameDef`] bundles the per-module configs. Defaults suit a local server;
//! `TESSERA_*` environment variables override them:
//!
//! | Variable                   | Field                          |
//! |----------------------------|--------------------------------|
//! | `TESSERA_TICK_RATE`        | ticks per second (`0`/`uncapped` = no cap) |
//! | `TESSERA_TILE_SIZE`        | world units per grid cell      |
//! | `TESSERA_SERVER_HOST`      | bind host                      |
//! | `TESSERA_SERVER_PORT`      | bind port                      |
//! | `TESSERA_CHUNK_SIZE`       | payload bytes per datagram     |
//! | `TESSERA_MAX_UNCONFIRMED`  | backpressure threshold         |
//! | `TESSERA_CLIENT_ONLY`      | skip physics and content update |

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::game::physics::PhysicsConfig;
use crate::game::world::GameConfig;
use crate::network::codec::{CHUNK_HEADER_LEN, MAX_DATAGRAM_LEN};
use crate::network::server::ServerConfig;
use crate::DEFAULT_TICK_RATE;

const ENV_PREFIX: &str = "TESSERA_";

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value could not be parsed
    #[error("Invalid value for {key}: {value:?}")]
    Invalid {
        /// Variable or entry name
        key: String,
        /// Offending value
        value: String,
    },

    /// Tile size must be positive
    #[error("Tile size must be positive, got {0}")]
    TileSize(f64),

    /// Chunks must carry at least one byte
    #[error("Chunk size must be at least 1")]
    ZeroChunkSize,

    /// Chunk plus header would not fit in one UDP datagram
    #[error("Chunk size {0} exceeds the largest UDP payload")]
    ChunkTooLarge(usize),

    /// A named content entry does not exist
    #[error("Missing configuration entry: {0}")]
    Missing(String),
}

/// Complete configuration of a game process.
#[derive(Debug, Clone)]
pub struct GameDef {
    /// Simulation settings
    pub game: GameConfig,
    /// Physics settings
    pub physics: PhysicsConfig,
    /// Server settings
    pub server: ServerConfig,
}

impl Default for GameDef {
    fn default() -> Self {
        Self {
            game: GameConfig {
                tick_rate: Some(DEFAULT_TICK_RATE),
                client_only_mode: false,
            },
            physics: PhysicsConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl GameDef {
    /// Defaults overridden by `TESSERA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, keyed by full variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut def = Self::default();

        if let Some(value) = var("TICK_RATE") {
            def.game.tick_rate = parse_tick_rate(&value)?;
        }
        if let Some(value) = var("TILE_SIZE") {
            def.physics.tile_size = parse("TILE_SIZE", &value)?;
        }
        if let Some(value) = var("CLIENT_ONLY") {
            def.game.client_only_mode = parse_flag("CLIENT_ONLY", &value)?;
        }

        let host = match var("SERVER_HOST") {
            Some(value) => parse::<IpAddr>("SERVER_HOST", &value)?,
            None => def.server.bind_addr.ip(),
        };
        let port = match var("SERVER_PORT") {
            Some(value) => parse::<u16>("SERVER_PORT", &value)?,
            None => def.server.bind_addr.port(),
        };
        def.server.bind_addr = SocketAddr::new(host, port);

        if let Some(value) = var("CHUNK_SIZE") {
            def.server.chunk_size = parse("CHUNK_SIZE", &value)?;
        }
        if let Some(value) = var("MAX_UNCONFIRMED") {
            def.server.max_unconfirmed = parse("MAX_UNCONFIRMED", &value)?;
        }

        def.validate()?;
        Ok(def)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.physics.tile_size.is_nan() || self.physics.tile_size <= 0.0 {
            return Err(ConfigError::TileSize(self.physics.tile_size));
        }
        if self.server.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.server.chunk_size + CHUNK_HEADER_LEN > MAX_DATAGRAM_LEN {
            return Err(ConfigError::ChunkTooLarge(self.server.chunk_size));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
    })
}

fn parse_tick_rate(value: &str) -> Result<Option<u32>, ConfigError> {
    match value.trim() {
        "uncapped" | "0" => Ok(None),
        other => parse("TICK_RATE", other).map(Some),
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: format!("{ENV_PREFIX}{key}"),
            value: value.to_string(),
        }),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_game_def_default() {
        let def = GameDef::default();
        assert_eq!(def.game.tick_rate, Some(60));
        assert!(!def.game.client_only_mode);
        assert_eq!(def.physics.tile_size, 16.0);
        assert_eq!(def.server.bind_addr.port(), 10001);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let def = GameDef::from_lookup(lookup(&[
            ("TESSERA_TICK_RATE", "30"),
            ("TESSERA_TILE_SIZE", "32"),
            ("TESSERA_SERVER_HOST", "127.0.0.1"),
            ("TESSERA_SERVER_PORT", "4000"),
            ("TESSERA_CHUNK_SIZE", "512"),
            ("TESSERA_MAX_UNCONFIRMED", "4"),
            ("TESSERA_CLIENT_ONLY", "true"),
        ]))
        .unwrap();

        assert_eq!(def.game.tick_rate, Some(30));
        assert_eq!(def.physics.tile_size, 32.0);
        assert_eq!(def.server.bind_addr, "127.0.0.1:4000".parse().unwrap());
        assert_eq!(def.server.chunk_size, 512);
        assert_eq!(def.server.max_unconfirmed, 4);
        assert!(def.game.client_only_mode);
    }

    #[test]
    fn test_uncapped_tick_rate() {
        for value in ["0", "uncapped"] {
            let def = GameDef::from_lookup(lookup(&[("TESSERA_TICK_RATE", value)])).unwrap();
            assert_eq!(def.game.tick_rate, None);
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = GameDef::from_lookup(lookup(&[("TESSERA_SERVER_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "TESSERA_SERVER_PORT"));

        assert!(matches!(
            GameDef::from_lookup(lookup(&[("TESSERA_TILE_SIZE", "0")])),
            Err(ConfigError::TileSize(_))
        ));
        assert!(matches!(
            GameDef::from_lookup(lookup(&[("TESSERA_CHUNK_SIZE", "0")])),
            Err(ConfigError::ZeroChunkSize)
        ));
        assert!(matches!(
            GameDef::from_lookup(lookup(&[("TESSERA_CHUNK_SIZE", "65492")])),
            Err(ConfigError::ChunkTooLarge(65492))
        ));
        assert!(GameDef::from_lookup(lookup(&[("TESSERA_CHUNK_SIZE", "65491")])).is_ok());
        assert!(GameDef::from_lookup(lookup(&[("TESSERA_CLIENT_ONLY", "maybe")])).is_err());
    }
}

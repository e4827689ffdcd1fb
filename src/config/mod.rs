//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

use crate::util::time::unix_millis;

/// Peer configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Local UDP bind address
    pub bind_addr: SocketAddr,
    /// Remote peer UDP address
    pub peer_addr: SocketAddr,
    /// Whether this peer is the match host (tie-breaking authority)
    pub host: bool,
    /// Display name for the local player
    pub player_name: String,
    /// Playfield width in world units
    pub world_width: f64,
    /// Playfield height in world units
    pub world_height: f64,
    /// Seed for local spawn pose generation
    pub match_seed: u64,
    /// Render debug overlays in the embedding client
    pub debug_overlay: bool,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:7600".to_string());

        let peer_addr = env::var("PEER_ADDR").map_err(|_| ConfigError::Missing("PEER_ADDR"))?;

        let host = env::var("MATCH_HOST")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let match_seed = match env::var("MATCH_SEED") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidSeed)?,
            Err(_) => unix_millis(),
        };

        Ok(Self {
            bind_addr: bind_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("BIND_ADDR"))?,
            peer_addr: peer_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("PEER_ADDR"))?,
            host,
            player_name: env::var("PLAYER_NAME").unwrap_or_else(|_| "Player".to_string()),
            world_width: world_dimension("WORLD_WIDTH", 1280.0)?,
            world_height: world_dimension("WORLD_HEIGHT", 720.0)?,
            match_seed,
            debug_overlay: env::var("DEBUG_OVERLAY")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Parse a world dimension. The wire format encodes positions as u16, so
/// dimensions are capped at 65535 units per axis.
fn world_dimension(var: &'static str, default: f64) -> Result<f64, ConfigError> {
    match env::var(var) {
        Ok(v) => {
            let parsed: f64 = v.parse().map_err(|_| ConfigError::InvalidDimension(var))?;
            if !(200.0..=u16::MAX as f64).contains(&parsed) {
                return Err(ConfigError::InvalidDimension(var));
            }
            Ok(parsed)
        }
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid socket address in {0}")]
    InvalidAddress(&'static str),

    #[error("Invalid world dimension in {0} (expected 200..=65535)")]
    InvalidDimension(&'static str),

    #[error("Invalid MATCH_SEED (expected u64)")]
    InvalidSeed,
}

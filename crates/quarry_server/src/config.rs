//! Server configuration.
//!
//! Deserialized from the binary's TOML config file; every field has a
//! default so a partial file (or none at all) still yields a runnable
//! server.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the TCP listener binds to.
    pub bind_address: String,
    /// Connection table capacity; further accepts are refused at login.
    pub max_connections: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Frame bodies at or above this size are deflate-compressed.
    /// Negative disables compression entirely.
    pub compression_threshold: i32,
    /// Optional pre-shared AES-128 key, base64-encoded. When set, every
    /// connection is enciphered from the first byte.
    pub encryption_key: Option<String>,
    /// Ticks between clientbound keepalives on Play connections.
    pub keepalive_interval_ticks: u64,
    /// Ticks a keepalive may go unacknowledged before a forced disconnect.
    pub keepalive_timeout_ticks: u64,
    /// A tick exceeding `budget * multiplier` logs an overrun warning.
    pub tick_warn_multiplier: f64,
    /// Seconds the tick thread may go silent before the watchdog kills the
    /// process.
    pub watchdog_timeout_secs: u64,
    /// Message of the day reported in status responses.
    pub motd: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:25600".to_string(),
            max_connections: 100,
            tick_rate: 20,
            compression_threshold: 256,
            encryption_key: None,
            keepalive_interval_ticks: 100,
            keepalive_timeout_ticks: 600,
            tick_warn_multiplier: 2.0,
            watchdog_timeout_secs: 60,
            motd: "A Quarry Server".to_string(),
        }
    }
}

impl ServerConfig {
    /// Wall-clock budget of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.tick_rate.max(1)))
    }

    /// Decodes the configured cipher key, if any.
    pub fn cipher_key(&self) -> Result<Option<[u8; 16]>, ServerError> {
        let Some(encoded) = &self.encryption_key else {
            return Ok(None);
        };
        let bytes = BASE64
            .decode(encoded)
            .map_err(|e| ServerError::Config(format!("encryption_key is not valid base64: {e}")))?;
        let key: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
            ServerError::Config(format!(
                "encryption_key must decode to 16 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Some(key))
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ServerError::Config(format!(
                "tick_rate must be between 1 and 1000, got {}",
                self.tick_rate
            )));
        }
        if self.max_connections == 0 {
            return Err(ServerError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.keepalive_timeout_ticks <= self.keepalive_interval_ticks {
            return Err(ServerError::Config(
                "keepalive_timeout_ticks must exceed keepalive_interval_ticks".to_string(),
            ));
        }
        self.cipher_key()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ServerConfig::default().validate().unwrap();
        assert_eq!(
            ServerConfig::default().tick_duration(),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn cipher_key_round_trips_base64() {
        let mut config = ServerConfig {
            encryption_key: Some(BASE64.encode([7u8; 16])),
            ..Default::default()
        };
        assert_eq!(config.cipher_key().unwrap(), Some([7u8; 16]));

        config.encryption_key = Some(BASE64.encode([1u8; 8]));
        assert!(matches!(config.cipher_key(), Err(ServerError::Config(_))));

        config.encryption_key = Some("not base64!!".to_string());
        assert!(matches!(config.cipher_key(), Err(ServerError::Config(_))));
    }

    #[test]
    fn bad_timings_are_rejected() {
        let config = ServerConfig {
            keepalive_interval_ticks: 100,
            keepalive_timeout_ticks: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

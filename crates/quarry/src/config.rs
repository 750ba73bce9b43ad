//! Application configuration loaded from a TOML file.

use std::path::Path;

use anyhow::Context;
use quarry_server::ServerConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter, overridable via `RUST_LOG`.
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads the config file, creating one with defaults if it is absent.
    pub async fn load_or_create(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig =
                toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Created default configuration file {}", path.display());
            Ok(config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        let config = AppConfig::load_or_create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(config.logging.level, "info");

        // A second load reads the file back identically.
        let reloaded = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded.server.bind_address, config.server.bind_address);
        assert_eq!(reloaded.server.tick_rate, config.server.tick_rate);
    }

    #[tokio::test]
    async fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        tokio::fs::write(&path, "[server]\nmotd = \"custom motd\"\n")
            .await
            .unwrap();
        let config = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(config.server.motd, "custom motd");
        assert_eq!(config.server.tick_rate, ServerConfig::default().tick_rate);
    }
}

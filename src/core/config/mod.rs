use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

pub mod lifecycle_config;

pub use lifecycle_config::LifecycleConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database_url: String,
    pub database_pool_size: u32,
    pub lifecycle: LifecycleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database_url: "postgres://localhost/tickets".to_string(),
            database_pool_size: 10,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `TICKETS_CONFIG` when set, otherwise the process environment.
    pub fn load_default() -> Result<Self> {
        match std::env::var("TICKETS_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::from_env()),
        }
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let get_str = |key: &str, default: &str| std::env::var(key).unwrap_or_else(|_| default.to_string());

        Self {
            server: ServerConfig {
                host: get_str("SERVER_HOST", &defaults.server.host),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            database_url: get_str("DATABASE_URL", &defaults.database_url),
            database_pool_size: std::env::var("DATABASE_POOL_SIZE")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.database_pool_size),
            lifecycle: LifecycleConfig::from_env(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.lifecycle = config.lifecycle.clamped();
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            r#"
database_url = "postgres://tickets@db/tickets"

[server]
port = 9090

[lifecycle]
max_bulk_tickets = 250
record_merge_on_sources = false
"#
        )
        .expect("write");

        let config = AppConfig::load(file.path()).expect("load");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database_url, "postgres://tickets@db/tickets");
        assert_eq!(config.lifecycle.max_bulk_tickets, 250);
        assert!(!config.lifecycle.record_merge_on_sources);
        assert_eq!(config.lifecycle.note_excerpt_chars, 140);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = AppConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionConfig {
    pub group: Option<String>,
    pub liveness_interval_secs: Option<u64>,
    pub no_data_threshold_secs: Option<u64>,
    pub rollup_interval_secs: Option<u64>,
    pub store_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: Option<ServerConfig>,
    pub database: Option<DatabaseConfig>,
    pub session: Option<SessionConfig>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppConfig {
    /// Load configuration from SENSORHUB_CONFIG path (TOML) if present, with reasonable defaults
    ///
    /// DATABASE_URL, when set, takes precedence over `[database] url`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("SENSORHUB_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut cfg = Self::from_path(&path)?;
        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database = Some(DatabaseConfig { url: Some(url) });
        }
        Ok(cfg)
    }

    /// Parse a TOML file, falling back to defaults when it does not exist
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let s = fs::read_to_string(path)?;
        Ok(toml::from_str::<AppConfig>(&s)?)
    }

    /// Get HTTP bind address (default 0.0.0.0:8000)
    pub fn http_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0:8000".to_string())
    }

    /// MySQL connection URL; no URL means records stay in memory
    pub fn database_url(&self) -> Option<String> {
        self.database
            .as_ref()
            .and_then(|d| d.url.clone())
            .filter(|url| !url.is_empty())
    }

    /// Broadcast group name (default "sensor_data")
    pub fn group(&self) -> String {
        self.session()
            .and_then(|s| s.group.clone())
            .unwrap_or_else(|| "sensor_data".to_string())
    }

    pub fn liveness_interval(&self) -> Duration {
        self.session_secs(|s| s.liveness_interval_secs, 1)
    }

    pub fn no_data_threshold(&self) -> Duration {
        self.session_secs(|s| s.no_data_threshold_secs, 10)
    }

    pub fn rollup_interval(&self) -> Duration {
        self.session_secs(|s| s.rollup_interval_secs, 60)
    }

    pub fn store_timeout(&self) -> Duration {
        self.session_secs(|s| s.store_timeout_secs, 5)
    }

    fn session(&self) -> Option<&SessionConfig> {
        self.session.as_ref()
    }

    fn session_secs(&self, field: impl Fn(&SessionConfig) -> Option<u64>, default: u64) -> Duration {
        let secs = self.session().and_then(field).filter(|s| *s > 0).unwrap_or(default);
        Duration::from_secs(secs)
    }
}

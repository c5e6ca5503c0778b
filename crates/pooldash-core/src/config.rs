//! Configuration types for pooldash

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::resources::TimeRange;

/// Default management API address
pub const DEFAULT_API_URL: &str = "http://localhost:8001";

/// Main dashboard configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Management API configuration
    pub api: ApiConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Persisted client state
    pub storage: StorageConfig,
    /// Presentation defaults
    pub ui: UiConfig,
}

impl DashboardConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, crate::PoolError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::PoolError::Config(format!("Failed to read config file: {}", e))
        })?;
        toml::from_str(&content)
            .map_err(|e| crate::PoolError::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Management API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the management API
    pub base_url: String,
    /// Value for the `X-API-Key` header, if the backend requires one
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or text)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Location of persisted client state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the preferences file (theme, access key)
    pub prefs_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let prefs_path = match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".config/pooldash/prefs.json"),
            None => PathBuf::from("pooldash-prefs.json"),
        };
        Self { prefs_path }
    }
}

/// Presentation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Rows per page in job and service listings
    pub page_size: usize,
    /// Default number of log lines requested
    pub log_tail: u32,
    /// Quiet period before a search query is dispatched
    pub search_debounce_ms: u64,
    /// Default monitoring window
    pub time_range: TimeRange,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            page_size: 10,
            log_tail: 100,
            search_debounce_ms: 300,
            time_range: TimeRange::Last24h,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.ui.page_size, 10);
        assert_eq!(config.ui.search_debounce_ms, 300);
        assert!(config.api.api_key.is_none());
    }

    #[test]
    fn test_partial_config_parse() {
        let toml_str = r#"
[api]
base_url = "http://pool.internal:8001"
api_key = "s3cret"

[ui]
log_tail = 250
time_range = "7d"
"#;
        let config: DashboardConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.api.base_url, "http://pool.internal:8001");
        assert_eq!(config.api.api_key.as_deref(), Some("s3cret"));
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.ui.log_tail, 250);
        assert_eq!(config.ui.page_size, 10);
        assert_eq!(config.ui.time_range, TimeRange::Last7d);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = DashboardConfig::from_file(Path::new("/nonexistent/pooldash.toml")).unwrap_err();
        assert!(matches!(err, crate::PoolError::Config(_)));
    }
}

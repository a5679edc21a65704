//! Configuration Module
//!
//! Runtime settings read from the environment.

use std::path::PathBuf;
use tracing::debug;

/// Production STARLINK host
pub const DEFAULT_API_URL: &str = "https://www.mysubaru.com";

const API_URL_VAR: &str = "SUBITO_API_URL";
const DATA_DIR_VAR: &str = "SUBITO_DATA_DIR";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Remote host every request is bound to, without a trailing slash
    pub api_base_url: String,
    /// Directory holding the secure store and logs
    pub data_dir: PathBuf,
}

impl Config {
    /// Build a config from `SUBITO_API_URL` and `SUBITO_DATA_DIR`, falling back to defaults
    pub fn from_env() -> Self {
        let api_base_url = std::env::var(API_URL_VAR)
            .unwrap_or_else(|_| DEFAULT_API_URL.to_string());

        let data_dir = std::env::var_os(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let config = Self::new(&api_base_url, data_dir);
        debug!("Loaded config: {:?}", config);
        config
    }

    /// Build a config from explicit values
    pub fn new(api_base_url: &str, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: api_base_url.trim().trim_end_matches('/').to_string(),
            data_dir: data_dir.into(),
        }
    }

    /// Where rolling log files are written
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL, default_data_dir())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Subito")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let config = Config::new("https://example.test/ ", "/tmp/subito");
        assert_eq!(config.api_base_url, "https://example.test");
    }

    #[test]
    fn logs_live_under_data_dir() {
        let config = Config::new(DEFAULT_API_URL, "/tmp/subito");
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/subito/logs"));
    }

    #[test]
    fn default_points_at_production_host() {
        let config = Config::default();
        assert_eq!(config.api_base_url, DEFAULT_API_URL);
        assert!(config.data_dir.ends_with("Subito"));
    }
}

//! Configuration for the permission engine
//!
//! The engine config is a TOML file with serde defaults for every field,
//! so a partial file (or none at all) is valid.
//!
//! # Example
//!
//! ```toml
//! version = 1
//! debug = false
//! cache_idle_secs = 600
//! log_conflicts = true
//! membership_prefix = "group."
//! ```

mod loader;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use loader::{config_path, permrs_base_dir, CONFIG_FILE, HOME_ENV};

/// Configuration system errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read or write config file
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML content
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to serialize config to TOML
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// Could not determine the config directory
    #[error("Config directory not available - could not resolve base path")]
    NoConfigDirectory,
}

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Config version for future migration support
    pub version: u32,

    /// Enable debug logging
    pub debug: bool,

    /// Idle time after which any cache entry expires
    pub cache_idle_secs: u64,

    /// Log conflicts found while answering queries
    pub log_conflicts: bool,

    /// Register the group membership special permission under this prefix
    /// (e.g. `"group."` makes `group.admin` test membership of `admin`)
    pub membership_prefix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            debug: false,
            cache_idle_secs: 600,
            log_conflicts: true,
            membership_prefix: None,
        }
    }
}

impl EngineConfig {
    /// Idle expiry for cache entries
    pub fn cache_idle(&self) -> Duration {
        Duration::from_secs(self.cache_idle_secs)
    }

    /// Load config from the default location, creating it if missing.
    pub fn load() -> ConfigResult<Self> {
        Self::load_from(config_path()?)
    }

    /// Load config from a file, creating a default one if missing.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            tracing::debug!("Loaded engine config from {:?}", path);
            Ok(config)
        } else {
            let default = Self::default();
            default.save_to(path)?;
            tracing::info!("Created default engine config at {:?}", path);
            Ok(default)
        }
    }

    /// Save config to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved engine config to {:?}", path);
        Ok(())
    }

    /// Reload config from a file.
    pub fn reload_from<P: AsRef<Path>>(&mut self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        *self = toml::from_str(&content)?;
        tracing::debug!("Reloaded engine config from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("permrs-config-{}-{}", name, std::process::id()))
            .join(CONFIG_FILE)
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.version, 1);
        assert!(!config.debug);
        assert_eq!(config.cache_idle(), Duration::from_secs(600));
        assert!(config.log_conflicts);
        assert!(config.membership_prefix.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: EngineConfig = toml::from_str("cache_idle_secs = 5").unwrap();
        assert_eq!(config.cache_idle_secs, 5);
        assert_eq!(config.version, 1);
        assert!(config.log_conflicts);
    }

    #[test]
    fn test_load_creates_default_then_reloads() {
        let path = temp_config("load");
        let _ = std::fs::remove_file(&path);

        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(path.exists());

        let edited = EngineConfig {
            debug: true,
            membership_prefix: Some("group.".to_string()),
            ..EngineConfig::default()
        };
        edited.save_to(&path).unwrap();

        let mut reloaded = EngineConfig::default();
        reloaded.reload_from(&path).unwrap();
        assert_eq!(reloaded, edited);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

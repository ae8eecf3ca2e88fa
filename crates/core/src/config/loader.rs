//! Config path resolution
//!
//! Handles resolving the engine config file location.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "PERMRS_HOME";

/// Config file name inside the base directory
pub const CONFIG_FILE: &str = "permrs.toml";

/// Returns the permrs base directory.
///
/// Uses `$PERMRS_HOME` when set, otherwise the directory holding
/// the running executable.
pub fn permrs_base_dir() -> ConfigResult<PathBuf> {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }

    let exe = std::env::current_exe().map_err(ConfigError::IoError)?;
    exe.parent()
        .map(PathBuf::from)
        .ok_or(ConfigError::NoConfigDirectory)
}

/// Returns the engine config path.
///
/// Path: `<base>/permrs.toml`
pub fn config_path() -> ConfigResult<PathBuf> {
    Ok(permrs_base_dir()?.join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_file_name() {
        let path = config_path().unwrap();
        assert!(path.ends_with(CONFIG_FILE));
    }
}

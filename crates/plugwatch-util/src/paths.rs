//! Default paths for plugwatch components
//!
//! Paths are user-writable by default (no root required):
//! - Data: `$XDG_DATA_HOME/plugwatch` or `~/.local/share/plugwatch`
//! - Config: `$XDG_CONFIG_HOME/plugwatch/config.toml` or `~/.config/plugwatch/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the data directory
pub const PLUGWATCH_DATA_DIR_ENV: &str = "PLUGWATCH_DATA_DIR";

/// Application subdirectory name
const APP_DIR: &str = "plugwatch";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "plugwatch.db";

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$PLUGWATCH_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/plugwatch` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/plugwatch` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(PLUGWATCH_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the PLUGWATCH_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join(CONFIG_FILENAME);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join(CONFIG_FILENAME);
    }

    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILENAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_contains_app_dir() {
        let path = data_dir_without_env();
        assert!(path.to_string_lossy().contains("plugwatch"));
    }

    #[test]
    fn config_path_ends_with_config_toml() {
        let path = default_config_path();
        assert!(path.ends_with("plugwatch/config.toml"));
    }
}

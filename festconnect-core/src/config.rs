//! Configuration loading and data folder resolution

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable overriding the data folder
pub const DATA_DIR_ENV: &str = "FESTCONNECT_DATA_DIR";

/// Database file name inside the data folder
pub const DATABASE_FILE: &str = "festconnect.db";

/// Legacy flat key-value file name inside the data folder
pub const LEGACY_FILE: &str = "legacy.json";

/// Where the record store keeps its data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// SQLite database file, created on first open
    File(PathBuf),
    /// Private in-memory database, lost when the store is dropped
    Memory,
    /// No persistent storage capability (headless)
    Unavailable,
}

/// Store configuration handed to the session at construction
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub location: StoreLocation,
}

impl StoreConfig {
    /// Database file inside `data_dir`
    pub fn in_folder(data_dir: &Path) -> Self {
        Self {
            location: StoreLocation::File(data_dir.join(DATABASE_FILE)),
        }
    }

    pub fn memory() -> Self {
        Self {
            location: StoreLocation::Memory,
        }
    }

    pub fn headless() -> Self {
        Self {
            location: StoreLocation::Unavailable,
        }
    }
}

/// Data folder resolution, in priority order:
/// 1. Explicit argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`data_dir` key)
/// 4. OS-dependent default (fallback)
pub fn resolve_data_folder(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Ok(config_path) = config_file_path() {
        match read_data_dir_from_toml(&config_path) {
            Ok(Some(path)) => return path,
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring config file {}: {}", config_path.display(), e),
        }
    }

    default_data_folder()
}

/// Read the `data_dir` key from a TOML config file
pub fn read_data_dir_from_toml(path: &Path) -> Result<Option<PathBuf>> {
    let content = std::fs::read_to_string(path)?;
    let config: toml::Value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    Ok(config
        .get("data_dir")
        .and_then(|v| v.as_str())
        .map(PathBuf::from))
}

/// Get the platform configuration file path, if it exists
fn config_file_path() -> Result<PathBuf> {
    let path = dirs::config_dir()
        .map(|d| d.join("festconnect").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if path.exists() {
        Ok(path)
    } else {
        Err(Error::Config(format!("Config file not found: {:?}", path)))
    }
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("festconnect"))
        .unwrap_or_else(|| PathBuf::from("./festconnect_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_cli_arg_wins_over_env() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/festconnect-env");
        let folder = resolve_data_folder(Some("/tmp/festconnect-cli"));
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(folder, PathBuf::from("/tmp/festconnect-cli"));
    }

    #[test]
    #[serial]
    fn test_env_used_without_cli_arg() {
        std::env::set_var(DATA_DIR_ENV, "/tmp/festconnect-env");
        let folder = resolve_data_folder(None);
        std::env::remove_var(DATA_DIR_ENV);

        assert_eq!(folder, PathBuf::from("/tmp/festconnect-env"));
    }

    #[test]
    fn test_toml_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = \"/srv/festconnect\"\n").unwrap();

        let resolved = read_data_dir_from_toml(&path).unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/srv/festconnect")));
    }

    #[test]
    fn test_toml_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();

        assert_eq!(read_data_dir_from_toml(&path).unwrap(), None);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "data_dir = [").unwrap();

        assert!(matches!(read_data_dir_from_toml(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_in_folder_uses_database_file() {
        let config = StoreConfig::in_folder(Path::new("/tmp/fc"));
        assert_eq!(
            config.location,
            StoreLocation::File(PathBuf::from("/tmp/fc/festconnect.db"))
        );
    }
}

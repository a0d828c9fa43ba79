//! Platform-specific configuration paths and data-root layout.

use crate::config::StationConfig;
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

/// Application name used for platform directories.
const APP_NAME: &str = "birdwatch";

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/birdwatch/`
/// - macOS: `~/Library/Application Support/birdwatch/`
/// - Windows: `%APPDATA%\birdwatch\`
pub fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or(Error::ConfigDirNotFound)
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Filesystem layout under the configured data root.
///
/// The detection database, reference databases, eBird packs, and audio
/// clips all live under one directory so a station can be backed up or
/// moved as a unit.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Build the layout from station configuration.
    pub fn new(station: &StationConfig) -> Self {
        Self {
            root: station.data_root.clone(),
        }
    }

    /// The data root itself.
    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// Detection database file.
    pub fn detection_db(&self) -> PathBuf {
        self.root.join("database").join("detections.db")
    }

    /// IOC taxonomy reference database file.
    pub fn ioc_db(&self) -> PathBuf {
        self.root.join("database").join("ioc_reference.db")
    }

    /// PatLevin translations reference database file.
    pub fn patlevin_db(&self) -> PathBuf {
        self.root.join("database").join("patlevin_reference.db")
    }

    /// Avibase translations reference database file.
    pub fn avibase_db(&self) -> PathBuf {
        self.root.join("database").join("avibase_reference.db")
    }

    /// Root directory for persisted audio clips.
    pub fn recordings_dir(&self) -> PathBuf {
        self.root.join("recordings")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_path_ends_with_toml() {
        let result = config_file_path();
        assert!(result.is_ok());
        let path = result.ok().unwrap();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_data_paths_layout() {
        let station = StationConfig {
            data_root: PathBuf::from("/srv/station"),
            ..StationConfig::default()
        };
        let paths = DataPaths::new(&station);
        assert_eq!(
            paths.detection_db(),
            PathBuf::from("/srv/station/database/detections.db")
        );
        assert_eq!(
            paths.recordings_dir(),
            PathBuf::from("/srv/station/recordings")
        );
    }
}

//! # Configuration Module
//!
//! Data directory setup and runtime settings for Mixtape.
//!
//! ## Data Storage
//!
//! Mixtape keeps its database (store, offline catalog and task queue in one SQLite
//! file), the worker PID file and an optional `config.json` in the platform data
//! directory:
//! - Linux: `~/.local/share/mixtape/`
//! - macOS: `~/Library/Application Support/mixtape/`
//! - Windows: `%APPDATA%\mixtape\`
//!
//! ## config.json
//!
//! Every field is optional; missing ones take their defaults.
//!
//! ```json
//! { "operating_mode": "inline", "user_stagger_secs": 30, "max_attempts": 5 }
//! ```

use crate::model::{DEFAULT_DAY_BOUNDARY, DEFAULT_RECOMMENDATION_SAMPLE};
use crate::scheduler::{PLAYLIST_STAGGER_SECS, USER_STAGGER_SECS};
use anyhow::{Context, Result};
use log::debug;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const PID_FILE_NAME: &str = "mixtape-worker.pid";

/// Returns the platform-appropriate data directory for Mixtape, creating it if
/// needed.
///
/// # Errors
///
/// Fails when the system data directory cannot be determined or the `mixtape`
/// subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let mixtape_dir = data_dir.join("mixtape");
    fs::create_dir_all(&mixtape_dir).with_context(|| {
        format!(
            "Failed to create Mixtape data directory at {}. Please check file permissions.",
            mixtape_dir.display()
        )
    })?;

    Ok(mixtape_dir)
}

/// Returns the default database file path, `mixtape.db` in the data directory.
///
/// ```no_run
/// use mixtape::config::get_db_path;
///
/// let db_path = get_db_path()?;
/// println!("Database location: {}", db_path.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("mixtape.db"))
}

/// Whether scheduled executions go through the task queue or run on the spot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// Enqueue into the SQLite task queue; `mixtape worker` delivers them.
    #[default]
    Deferred,
    /// Run every emitted execution immediately, in order, ignoring delays.
    Inline,
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    pub operating_mode: OperatingMode,
    pub user_stagger_secs: u64,
    pub playlist_stagger_secs: u64,
    /// Worker sleep between queue polls.
    pub poll_interval_secs: u64,
    /// Deliveries of one task before it is dropped.
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub default_recommendation_sample: u32,
    pub default_day_boundary: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            db_path: get_db_path().unwrap_or_else(|_| PathBuf::from("mixtape.db")),
            operating_mode: OperatingMode::Deferred,
            user_stagger_secs: USER_STAGGER_SECS,
            playlist_stagger_secs: PLAYLIST_STAGGER_SECS,
            poll_interval_secs: 5,
            max_attempts: 5,
            retry_delay_secs: 60,
            default_recommendation_sample: DEFAULT_RECOMMENDATION_SAMPLE,
            default_day_boundary: DEFAULT_DAY_BOUNDARY,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with `config.json` from the data directory, if present.
    pub fn load() -> Result<Self> {
        Self::load_from(&get_data_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Override the database location. Relative paths are made absolute.
    pub fn with_db_path(mut self, db_path: &Path) -> Result<Self> {
        self.db_path = db_path
            .absolutize()
            .with_context(|| format!("Invalid database path {}", db_path.display()))?
            .into_owned();
        Ok(self)
    }

    /// Worker PID file, kept beside the database so separate databases get
    /// separate workers.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.db_path.with_file_name(PID_FILE_NAME)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_get_db_path_structure() {
        let path = get_db_path().expect("Should get valid path");
        assert!(path.is_absolute(), "Database path should be absolute");
        assert!(path.to_string_lossy().ends_with("mixtape.db"));

        let parent = path.parent().expect("Should have parent directory");
        assert_eq!(parent.file_name().unwrap(), "mixtape");
        assert!(parent.is_dir());
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.operating_mode, OperatingMode::Deferred);
        assert_eq!(config.user_stagger_secs, 30);
        assert_eq!(config.playlist_stagger_secs, 6);
        assert_eq!(config.default_recommendation_sample, 10);
        assert_eq!(config.default_day_boundary, 21);
    }

    #[test]
    fn test_missing_file_means_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let config = RuntimeConfig::load_from(&temp_dir.path().join(CONFIG_FILE_NAME))?;
        assert_eq!(config, RuntimeConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_file_overlays_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{ "operating_mode": "inline", "max_attempts": 2 }"#)?;

        let config = RuntimeConfig::load_from(&path)?;
        assert_eq!(config.operating_mode, OperatingMode::Inline);
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retry_delay_secs, 60);
        Ok(())
    }

    #[test]
    fn test_invalid_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "{ not json")?;
        assert!(RuntimeConfig::load_from(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_db_override_is_absolute_and_moves_pid_file() -> Result<()> {
        let config = RuntimeConfig::default().with_db_path(Path::new("data/test.db"))?;
        assert!(config.db_path.is_absolute());
        assert!(config.db_path.ends_with("data/test.db"));
        assert!(config.pid_file().ends_with("data/mixtape-worker.pid"));
        Ok(())
    }
}

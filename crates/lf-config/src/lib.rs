//! # lf-config
//!
//! Startup configuration for LucidFlow. Resolved once, then handed to the plugins and services,
//! so nothing reads the environment while serving requests.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional TOML file (`lucidflow.toml`, or the path in `LUCIDFLOW_CONFIG`)
//! 3. `LUCIDFLOW__SECTION__KEY` environment variables (a `.env` file is loaded first)

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "lucidflow";
const ENV_PREFIX: &str = "LUCIDFLOW";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub janitor: JanitorSettings,
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Every file operation is confined to this directory
    pub root: PathBuf,
    /// Holding area for uploads not yet attached to a post, relative to `root`
    pub staging_dir: PathBuf,
    /// Files backing attached images, relative to `root`
    pub permanent_dir: PathBuf,
    pub temp_expiration_ms: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            staging_dir: PathBuf::from("images/temp"),
            permanent_dir: PathBuf::from("images"),
            temp_expiration_ms: 30 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JanitorSettings {
    pub temp_sweep_interval_ms: u64,
    pub orphan_sweep_interval_ms: u64,
}

impl Default for JanitorSettings {
    fn default() -> Self {
        Self {
            temp_sweep_interval_ms: 60 * 60 * 1000,
            orphan_sweep_interval_ms: 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite://lucidflow.db?mode=rwc".to_string(),
        }
    }
}

impl Settings {
    /// Loads `.env`, the config file and the environment, then validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = std::env::var("LUCIDFLOW_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_file(Path::new(&file))
    }

    /// Same as [`Settings::load`] without touching `.env`. A missing file is not an error.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        tracing::debug!(?settings, "configuration loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let storage = &self.storage;

        if storage.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage.root cannot be empty".into()));
        }

        for (name, dir) in [
            ("storage.staging_dir", &storage.staging_dir),
            ("storage.permanent_dir", &storage.permanent_dir),
        ] {
            if dir.as_os_str().is_empty() || dir.is_absolute() || dir.has_root() {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-empty path relative to storage.root"
                )));
            }
        }

        if storage.staging_dir == storage.permanent_dir {
            return Err(ConfigError::Invalid(
                "storage.staging_dir and storage.permanent_dir must differ".into(),
            ));
        }

        if storage.temp_expiration_ms == 0
            || self.janitor.temp_sweep_interval_ms == 0
            || self.janitor.orphan_sweep_interval_ms == 0
        {
            return Err(ConfigError::Invalid("durations must be greater than zero".into()));
        }

        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Invalid("database.url cannot be empty".into()));
        }

        Ok(())
    }
}

impl StorageSettings {
    pub fn temp_expiration(&self) -> Duration {
        Duration::from_millis(self.temp_expiration_ms)
    }
}

impl JanitorSettings {
    pub fn temp_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.temp_sweep_interval_ms)
    }

    pub fn orphan_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.orphan_sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.storage.temp_expiration(), Duration::from_secs(30 * 60));
        assert_eq!(settings.janitor.orphan_sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn file_overrides_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lucidflow.toml");
        fs::write(
            &path,
            r#"
            [storage]
            root = "/var/lib/lucidflow"
            temp_expiration_ms = 5000

            [janitor]
            temp_sweep_interval_ms = 1000
            "#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();

        assert_eq!(settings.storage.root, PathBuf::from("/var/lib/lucidflow"));
        assert_eq!(settings.storage.staging_dir, PathBuf::from("images/temp"));
        assert_eq!(settings.storage.temp_expiration_ms, 5000);
        assert_eq!(settings.janitor.temp_sweep_interval_ms, 1000);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::from_file(&temp.path().join("absent.toml")).unwrap();

        assert_eq!(settings.storage.permanent_dir, PathBuf::from("images"));
    }

    #[test]
    fn absolute_subdirectories_are_rejected() {
        let mut settings = Settings::default();
        settings.storage.staging_dir = PathBuf::from("/tmp/staging");

        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let mut settings = Settings::default();
        settings.janitor.orphan_sweep_interval_ms = 0;

        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }
}

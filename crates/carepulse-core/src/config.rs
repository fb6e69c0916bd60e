//! CarePulse configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CarePulseError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarePulseConfig {
    /// Where file and SQLite stores keep their data. `~` and `$VAR` are expanded.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_data_dir() -> String {
    "~/.carepulse".into()
}

impl Default for CarePulseConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl CarePulseConfig {
    /// Load config from the default path (~/.carepulse/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CarePulseError::Config(format!("Failed to read config: {e}")))?;
        tracing::debug!("📄 Config loaded from {}", path.display());
        Self::parse(&content)
    }

    /// Parse config from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CarePulseError::Config(format!("Failed to parse config: {e}")))
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| CarePulseError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the CarePulse home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carepulse")
    }

    /// `data_dir` with `~` and env vars expanded.
    pub fn data_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.data_dir)
            .map_err(|e| CarePulseError::Config(format!("Bad data_dir '{}': {e}", self.data_dir)))?;
        Ok(PathBuf::from(expanded.into_owned()))
    }
}

/// Which key-value backend holds entity collections and reminder markers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Sqlite,
    /// Nothing survives the process. Useful for dry runs.
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = CarePulseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(CarePulseError::Config(format!("unknown store backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between ticks. The reminder window is one minute wide, so
    /// anything above 60 can skip reminders.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Whether the host lets us show notifications at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyPermission {
    #[default]
    Granted,
    Denied,
    Unsupported,
}

/// Notification preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Play a sound for appointment reminders.
    #[serde(default = "bool_true")]
    pub appointments: bool,
    /// Play a sound for medication reminders.
    #[serde(default = "bool_true")]
    pub medications: bool,
    /// Play a sound for task reminders.
    #[serde(default = "bool_true")]
    pub tasks: bool,
    #[serde(default)]
    pub permission: NotifyPermission,
}

fn bool_true() -> bool {
    true
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            appointments: true,
            medications: true,
            tasks: true,
            permission: NotifyPermission::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CarePulseConfig::parse("").unwrap();
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert!(config.notifications.medications);
        assert_eq!(config.notifications.permission, NotifyPermission::Granted);
    }

    #[test]
    fn test_partial_config() {
        let config = CarePulseConfig::parse(
            r#"
            data_dir = "/tmp/cp"

            [store]
            backend = "sqlite"

            [notifications]
            tasks = false
            permission = "denied"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_path().unwrap(), PathBuf::from("/tmp/cp"));
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(!config.notifications.tasks);
        assert!(config.notifications.appointments);
        assert_eq!(config.notifications.permission, NotifyPermission::Denied);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = CarePulseConfig::parse("data_dir = [").unwrap_err();
        assert!(matches!(err, CarePulseError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = CarePulseConfig::default();
        config.scheduler.poll_interval_secs = 30;
        config.save_to(&path).unwrap();

        let loaded = CarePulseConfig::load_from(&path).unwrap();
        assert_eq!(loaded.scheduler.poll_interval_secs, 30);
    }

    #[test]
    fn test_data_path_expands_env_vars() {
        let home = dirs::home_dir().unwrap();
        let config = CarePulseConfig {
            data_dir: "~/cp-data".into(),
            ..Default::default()
        };
        assert_eq!(config.data_path().unwrap(), home.join("cp-data"));

        // PATH is set in every test environment.
        let path_var = std::env::var("PATH").unwrap();
        let config = CarePulseConfig {
            data_dir: "$PATH/cp".into(),
            ..Default::default()
        };
        assert_eq!(config.data_path().unwrap(), PathBuf::from(format!("{path_var}/cp")));

        let config = CarePulseConfig {
            data_dir: "$CAREPULSE_SURELY_UNSET_VAR/cp".into(),
            ..Default::default()
        };
        assert!(matches!(config.data_path().unwrap_err(), CarePulseError::Config(_)));
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("redis".parse::<StoreBackend>().is_err());
    }
}

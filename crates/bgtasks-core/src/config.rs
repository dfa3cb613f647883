//! BGTasks configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BgTasksError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgTasksConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
    #[serde(default)]
    pub host: HostConfig,
}

fn default_data_dir() -> String { "~/.bgtasks".into() }

impl Default for BgTasksConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tasks: TasksConfig::default(),
            telemetry: TelemetryConfig::default(),
            event_log: EventLogConfig::default(),
            host: HostConfig::default(),
        }
    }
}

impl BgTasksConfig {
    /// Load config from the default path (~/.bgtasks/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BgTasksError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| BgTasksError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        tracing::debug!("⚙️ Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BgTasksError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.tasks.max_processing_tasks == 0 {
            return Err(BgTasksError::Config(
                "tasks.max_processing_tasks must be at least 1".into(),
            ));
        }
        if self.host.tick_secs == 0 {
            return Err(BgTasksError::Config("host.tick_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the BGTasks home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".bgtasks")
    }

    /// Data directory with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).to_string())
    }
}

/// Job identity and chain width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_max_processing_tasks")]
    pub max_processing_tasks: usize,
}

fn default_namespace() -> String { "dev.bgtasks".into() }
fn default_max_processing_tasks() -> usize { 3 }

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            max_processing_tasks: default_max_processing_tasks(),
        }
    }
}

/// Telemetry sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn bool_true() -> bool { true }
fn default_base_url() -> String { "http://127.0.0.1:8787".into() }
fn default_timeout_secs() -> u64 { 30 }

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_log_name")]
    pub name: String,
}

fn default_log_name() -> String { "bgtasks".into() }

impl Default for EventLogConfig {
    fn default() -> Self {
        Self { name: default_log_name() }
    }
}

/// Local host (in-process background scheduler) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Delay before a request without an earliest begin date becomes eligible.
    #[serde(default = "default_min_gap_secs")]
    pub min_gap_secs: u64,
    #[serde(default = "default_refresh_deadline")]
    pub refresh_deadline_secs: u64,
    #[serde(default = "default_processing_deadline")]
    pub processing_deadline_secs: u64,
    #[serde(default = "default_max_pending_processing")]
    pub max_pending_processing: usize,
    #[serde(default = "bool_true")]
    pub network_available: bool,
    #[serde(default = "bool_true")]
    pub on_external_power: bool,
    #[serde(default = "default_probe_secs")]
    pub connectivity_probe_secs: u64,
}

fn default_tick_secs() -> u64 { 5 }
fn default_min_gap_secs() -> u64 { 60 }
fn default_refresh_deadline() -> u64 { 30 }
fn default_processing_deadline() -> u64 { 300 }
fn default_max_pending_processing() -> usize { 10 }
fn default_probe_secs() -> u64 { 30 }

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            min_gap_secs: default_min_gap_secs(),
            refresh_deadline_secs: default_refresh_deadline(),
            processing_deadline_secs: default_processing_deadline(),
            max_pending_processing: default_max_pending_processing(),
            network_available: true,
            on_external_power: true,
            connectivity_probe_secs: default_probe_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: BgTasksConfig = toml::from_str("").unwrap();
        assert_eq!(config.tasks.max_processing_tasks, 3);
        assert_eq!(config.tasks.namespace, "dev.bgtasks");
        assert_eq!(config.event_log.name, "bgtasks");
        assert!(config.telemetry.enabled);
        assert_eq!(config.host.tick_secs, 5);
    }

    #[test]
    fn test_partial_section_override() {
        let config: BgTasksConfig = toml::from_str(
            r#"
            [tasks]
            max_processing_tasks = 5

            [host]
            network_available = false
            "#,
        )
        .unwrap();
        assert_eq!(config.tasks.max_processing_tasks, 5);
        assert_eq!(config.tasks.namespace, "dev.bgtasks");
        assert!(!config.host.network_available);
        assert!(config.host.on_external_power);
    }

    #[test]
    fn test_zero_processing_tasks_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tasks]\nmax_processing_tasks = 0\n").unwrap();
        let err = BgTasksConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, BgTasksError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = BgTasksConfig::default();
        config.telemetry.base_url = "https://telemetry.example".into();
        config.save_to(&path).unwrap();

        let loaded = BgTasksConfig::load_from(&path).unwrap();
        assert_eq!(loaded.telemetry.base_url, "https://telemetry.example");
    }
}

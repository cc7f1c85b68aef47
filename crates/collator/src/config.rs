//! Configuration for the collator service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service configuration. Directories and queue address are required;
/// every interval has a production default and can be tightened for
/// tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unique service name, used in status messages and queue envelopes.
    pub service_name: String,

    /// Directory watched for incoming numbered files.
    pub watch_dir: PathBuf,

    /// Directory receiving built documents.
    pub output_dir: PathBuf,

    /// Directory receiving the files of sequences that failed to build.
    pub quarantine_dir: PathBuf,

    /// Queue broker address.
    #[serde(default = "default_queue_addr")]
    pub queue_addr: String,

    /// Wait between scan attempts while assembling a sequence (ms).
    /// Runtime-adjustable through the `Timeout` queue setting.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Scan attempts per assembly call.
    #[serde(default = "default_max_scan_attempts")]
    pub max_scan_attempts: u32,

    /// Worker sleep after an idle iteration (ms).
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Wait between settings polls (ms).
    #[serde(default = "default_settings_interval_ms")]
    pub settings_interval_ms: u64,

    /// Wait between heartbeat status publications (secs).
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_queue_addr() -> String {
    "tcp://127.0.0.1:5560".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_max_scan_attempts() -> u32 {
    crate::assembler::DEFAULT_MAX_ATTEMPTS
}

fn default_idle_interval_ms() -> u64 {
    1000
}

fn default_settings_interval_ms() -> u64 {
    100
}

fn default_heartbeat_interval_secs() -> u64 {
    60
}

impl ServiceConfig {
    /// Config with production intervals for the given name and root
    /// directories.
    pub fn new(
        service_name: impl Into<String>,
        watch_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        quarantine_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            watch_dir: watch_dir.into(),
            output_dir: output_dir.into(),
            quarantine_dir: quarantine_dir.into(),
            queue_addr: default_queue_addr(),
            poll_timeout_ms: default_poll_timeout_ms(),
            max_scan_attempts: default_max_scan_attempts(),
            idle_interval_ms: default_idle_interval_ms(),
            settings_interval_ms: default_settings_interval_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)
            .map_err(|e| crate::error::CollatorError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::CollatorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

//! Termination options and their persisted defaults.
//!
//! Defaults are stored in JSON format at `~/.portterminator/config.json`.
//! Every key is optional; missing keys fall back to the built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::domain::ProtocolFilter;
use crate::error::{Error, Result};

pub const DEFAULT_GRACEFUL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_OVERALL_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Options consumed by the orchestrator, finder and killer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    /// Transports to enumerate and terminate.
    pub protocol: ProtocolFilter,

    /// Skip the graceful phase and kill immediately.
    pub force: bool,

    /// Grace period between the polite request and the forced kill.
    pub graceful_timeout_ms: u64,

    /// Ceiling for waits on a port becoming free.
    pub overall_timeout_ms: u64,

    /// Ceiling for each helper command (lsof, ss, netstat, ...).
    pub command_timeout_ms: u64,

    /// Suppress informational output.
    pub quiet: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            protocol: ProtocolFilter::Both,
            force: false,
            graceful_timeout_ms: DEFAULT_GRACEFUL_TIMEOUT_MS,
            overall_timeout_ms: DEFAULT_OVERALL_TIMEOUT_MS,
            command_timeout_ms: DEFAULT_COMMAND_TIMEOUT_MS,
            quiet: false,
        }
    }
}

impl Options {
    pub fn with_protocol(mut self, protocol: ProtocolFilter) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_graceful_timeout_ms(mut self, ms: u64) -> Self {
        self.graceful_timeout_ms = ms;
        self
    }

    pub fn with_overall_timeout_ms(mut self, ms: u64) -> Self {
        self.overall_timeout_ms = ms;
        self
    }

    pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn graceful_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Reject values that would make every operation time out instantly.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("overallTimeoutMs", self.overall_timeout_ms),
            ("commandTimeoutMs", self.command_timeout_ms),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}

/// Configuration store for persisted default options.
///
/// Handles reading and writing `~/.portterminator/config.json`.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    /// Path to the configuration file.
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a new config store with the default path.
    ///
    /// Default path: `~/.portterminator/config.json`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;

        let config_path = home.join(".portterminator").join("config.json");
        Ok(Self { config_path })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load options from disk.
    ///
    /// Returns default options if the file doesn't exist.
    pub async fn load(&self) -> Result<Options> {
        if !self.exists() {
            return Ok(Options::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        let options: Options = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Save options to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub async fn save(&self, options: &Options) -> Result<()> {
        options.validate()?;

        if let Some(config_dir) = self.config_path.parent() {
            fs::create_dir_all(config_dir)
                .await
                .map_err(|e| Error::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(options)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        // Write atomically by writing to temp file then renaming
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;

        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;

        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }

    /// Write the built-in defaults unless a config file already exists.
    ///
    /// Returns whether a file was written.
    pub async fn init(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        self.save(&Options::default()).await?;
        Ok(true)
    }
}

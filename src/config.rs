//! Configuration for serialscope
//!
//! Configuration is read from a TOML file and never written back. Every
//! field has a default, so an empty file (or no file) yields a working
//! single-link capture on the default port settings.
//!
//! # Example
//!
//! ```toml
//! [[links]]
//! name = "arduino"
//! port = "/dev/ttyACM0"
//! baud_rate = 115200
//! reconnect_delay_ms = 500
//!
//! [capture]
//! signals = ["voltage", "current"]
//! capacity = 500
//! output_dir = "captures"
//! ```

use crate::buffer::{MultiSignalRegistry, DEFAULT_CAPACITY};
use crate::error::{Result, ResultExt, ScopeError};
use crate::serial::{LinkSettings, SerialLink, SerialSettings, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Default pause between reconnect attempts in milliseconds
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Default consecutive read failures before a link closes its port
pub const DEFAULT_MAX_READ_ATTEMPTS: u32 = 10;

/// Default port re-enumeration interval in milliseconds
pub const DEFAULT_PORTS_REFRESH_MS: u64 = 1000;

/// Default signal name for single-channel captures
pub const DEFAULT_SIGNAL: &str = "value";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Serial links to open
    #[serde(default)]
    pub links: Vec<LinkConfig>,

    /// Buffering and export of received samples
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Read and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScopeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content).with_context(|| format!("Loading {}", path.display()))
    }

    /// Read a configuration file, falling back to defaults on any failure
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ScopeError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for link in &self.links {
            link.validate()?;
            if !names.insert(link.name.as_str()) {
                return Err(ScopeError::DuplicateName(link.name.clone()));
            }
        }
        self.capture.validate()
    }
}

/// One serial link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Logical name, used to tag payloads and address writes
    pub name: String,

    /// Port to bind; a link without one waits for `set_port`
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Line read timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_read_attempts")]
    pub max_read_attempts: u32,

    /// Zero disables port enumeration
    #[serde(default = "default_ports_refresh_ms")]
    pub ports_refresh_ms: u64,

    /// Tag payloads as `{name: payload}`
    #[serde(default = "default_true")]
    pub emit_as_dict: bool,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_reconnect_delay_ms() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_max_read_attempts() -> u32 {
    DEFAULT_MAX_READ_ATTEMPTS
}

fn default_ports_refresh_ms() -> u64 {
    DEFAULT_PORTS_REFRESH_MS
}

fn default_true() -> bool {
    true
}

impl LinkConfig {
    /// A link on `port` with every other field at its default
    pub fn new(name: impl Into<String>, port: Option<String>) -> Self {
        Self {
            name: name.into(),
            port,
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_read_attempts: DEFAULT_MAX_READ_ATTEMPTS,
            ports_refresh_ms: DEFAULT_PORTS_REFRESH_MS,
            emit_as_dict: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScopeError::Config("link name must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(ScopeError::Config(format!(
                "link '{}': baud_rate must be non-zero",
                self.name
            )));
        }
        if self.max_read_attempts == 0 {
            return Err(ScopeError::Config(format!(
                "link '{}': max_read_attempts must be at least 1",
                self.name
            )));
        }
        Ok(())
    }

    /// Port settings for the transport
    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings {
            baud_rate: self.baud_rate,
            timeout: Duration::from_millis(self.timeout_ms),
            ..SerialSettings::default()
        }
    }

    /// Tunables for the link worker
    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_read_attempts: self.max_read_attempts,
            ports_refresh_interval: Duration::from_millis(self.ports_refresh_ms),
            emit_as_dict: self.emit_as_dict,
            emitter_enabled: true,
        }
    }

    /// Build an idle link on an operating system serial port
    pub fn build_link(&self) -> Result<SerialLink> {
        self.validate()?;
        Ok(SerialLink::serial(
            self.name.clone(),
            self.port.clone(),
            self.serial_settings(),
            self.link_settings(),
        ))
    }
}

/// Buffering of received samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Signal names; the first is the one whose `full` event triggers export
    #[serde(default = "default_signals")]
    pub signals: Vec<String>,

    /// Samples kept per signal
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Keep a shared elapsed-time column
    #[serde(default = "default_true")]
    pub timed: bool,

    /// Empty the buffers after each export
    ///
    /// When false the buffers keep rolling and a snapshot is exported every
    /// `capacity` samples.
    #[serde(default = "default_true")]
    pub auto_clear: bool,

    /// Directory for exported CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_signals() -> Vec<String> {
    vec![DEFAULT_SIGNAL.to_string()]
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("captures")
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            signals: default_signals(),
            capacity: DEFAULT_CAPACITY,
            timed: true,
            auto_clear: true,
            output_dir: default_output_dir(),
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ScopeError::Config("capture capacity must be at least 1".into()));
        }
        if self.signals.is_empty() {
            return Err(ScopeError::Config("capture needs at least one signal".into()));
        }
        Ok(())
    }

    /// Build the registry described by this section
    pub fn build_registry(&self) -> Result<MultiSignalRegistry> {
        MultiSignalRegistry::new(self.signals.iter().cloned(), self.capacity, self.timed)
    }
}

//! Transport trait for a unified serial connection interface
//!
//! This module provides a common trait for serial connections so that a
//! [`SerialLink`](super::SerialLink) can drive real hardware (via the
//! `serialport` crate) or an in-process virtual device for testing.
//! Implementations report every failure as an error; the link decides
//! whether a failure is retried.

use crate::error::{Result, ScopeError};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default baud rate for new transports
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default read timeout for line reads
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest line accepted before the pending data is discarded
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Size of a single read from the port
const READ_CHUNK: usize = 256;

/// A single connection parameter that can be changed while closed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportOption {
    /// Symbols per second
    BaudRate(u32),
    /// Bits per character
    DataBits(DataBits),
    /// Parity checking mode
    Parity(Parity),
    /// Number of stop bits
    StopBits(StopBits),
    /// How long a line read may block
    Timeout(Duration),
}

/// Unified interface for serial connections
///
/// Implementations must be `Send` so a link worker can own them.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send {
    /// Open the connection to the bound port
    fn open(&mut self) -> Result<()>;

    /// Close the connection; closing a closed transport succeeds
    fn close(&mut self) -> Result<()>;

    /// Whether the connection is open
    fn is_open(&self) -> bool;

    /// Read one line with its line terminator stripped
    ///
    /// Returns an empty string when no complete line arrived before the read
    /// timeout.
    fn read_line(&mut self) -> Result<String>;

    /// Write raw bytes
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Port the transport is bound to
    fn port(&self) -> Option<String>;

    /// Bind to a different port (or none); takes effect on the next open
    fn set_port(&mut self, port: Option<String>);

    /// Apply a connection option; closes the connection first
    fn apply(&mut self, option: TransportOption) -> Result<()>;
}

/// Source of the currently available port names
#[cfg_attr(test, mockall::automock)]
pub trait PortEnumerator: Send + Sync {
    /// List the port identifiers present right now
    fn list_ports(&self) -> Result<Vec<String>>;
}

/// Serial line settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SerialSettings {
    /// Symbols per second
    pub baud_rate: u32,
    /// Bits per character
    pub data_bits: DataBits,
    /// Parity checking mode
    pub parity: Parity,
    /// Number of stop bits
    pub stop_bits: StopBits,
    /// How long a line read may block
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialSettings {
    /// Apply a single option
    pub fn apply(&mut self, option: TransportOption) -> Result<()> {
        match option {
            TransportOption::BaudRate(0) => {
                return Err(ScopeError::Validation("baud rate must be non-zero".into()))
            }
            TransportOption::BaudRate(rate) => self.baud_rate = rate,
            TransportOption::DataBits(bits) => self.data_bits = bits,
            TransportOption::Parity(parity) => self.parity = parity,
            TransportOption::StopBits(bits) => self.stop_bits = bits,
            TransportOption::Timeout(timeout) => self.timeout = timeout,
        }
        Ok(())
    }
}

/// Take one complete line out of `pending`, if there is one
pub(crate) fn take_line(pending: &mut Vec<u8>) -> Result<Option<String>> {
    let Some(end) = pending.iter().position(|&b| b == b'\n') else {
        return Ok(None);
    };
    let raw: Vec<u8> = pending.drain(..=end).collect();
    let line = String::from_utf8(raw)
        .map_err(|e| ScopeError::Transport(format!("received invalid UTF-8: {}", e)))?;
    Ok(Some(line.trim_end().to_string()))
}

/// Transport backed by an operating system serial port
pub struct SerialPortTransport {
    port: Option<String>,
    settings: SerialSettings,
    handle: Option<Box<dyn SerialPort>>,
    /// Bytes received but not yet returned as a line
    pending: Vec<u8>,
}

impl std::fmt::Debug for SerialPortTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPortTransport")
            .field("port", &self.port)
            .field("settings", &self.settings)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl SerialPortTransport {
    /// Create a closed transport, optionally bound to a port
    pub fn new(port: Option<String>, settings: SerialSettings) -> Self {
        Self {
            port,
            settings,
            handle: None,
            pending: Vec::new(),
        }
    }

    /// Create a closed transport bound to `port` at `baud_rate`
    pub fn with_baud_rate(port: impl Into<String>, baud_rate: u32) -> Self {
        Self::new(
            Some(port.into()),
            SerialSettings {
                baud_rate,
                ..SerialSettings::default()
            },
        )
    }

    /// Current line settings
    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

impl Transport for SerialPortTransport {
    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let name = self
            .port
            .as_deref()
            .ok_or_else(|| ScopeError::Transport("no port configured".to_string()))?;

        let handle = serialport::new(name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .parity(self.settings.parity)
            .stop_bits(self.settings.stop_bits)
            .timeout(self.settings.timeout)
            .open()?;

        tracing::debug!(port = %name, baud = self.settings.baud_rate, "Opened serial port");
        self.pending.clear();
        self.handle = Some(handle);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(port = ?handle.name(), "Closed serial port");
        }
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn read_line(&mut self) -> Result<String> {
        let handle = self.handle.as_mut().ok_or(ScopeError::NotOpen)?;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(line) = take_line(&mut self.pending)? {
                return Ok(line);
            }
            if self.pending.len() > MAX_LINE_LEN {
                self.pending.clear();
                return Err(ScopeError::Transport(format!(
                    "line longer than {} bytes discarded",
                    MAX_LINE_LEN
                )));
            }

            match handle.read(&mut chunk) {
                Ok(0) => return Ok(String::new()),
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(String::new()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let handle = self.handle.as_mut().ok_or(ScopeError::NotOpen)?;
        handle.write_all(bytes)?;
        handle.flush()?;
        Ok(())
    }

    fn port(&self) -> Option<String> {
        self.port.clone()
    }

    fn set_port(&mut self, port: Option<String>) {
        self.port = port;
    }

    fn apply(&mut self, option: TransportOption) -> Result<()> {
        self.close()?;
        self.settings.apply(option)
    }
}

/// Enumerates the ports reported by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn list_ports(&self) -> Result<Vec<String>> {
        Ok(serialport::available_ports()?
            .into_iter()
            .map(|info| info.port_name)
            .collect())
    }
}

/// A port list that only changes when told to
///
/// Clones share the same list, so a test or a virtual device manager can
/// keep a handle and "plug" or "unplug" ports while a link watches them.
#[derive(Debug, Clone, Default)]
pub struct StaticPorts {
    ports: Arc<RwLock<Vec<String>>>,
}

impl StaticPorts {
    /// Create a list with the given ports
    pub fn new<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ports: Arc::new(RwLock::new(ports.into_iter().map(Into::into).collect())),
        }
    }

    /// Replace the list
    pub fn set<I, S>(&self, ports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = self.ports.write().unwrap_or_else(|e| e.into_inner());
        *list = ports.into_iter().map(Into::into).collect();
    }
}

impl PortEnumerator for StaticPorts {
    fn list_ports(&self) -> Result<Vec<String>> {
        Ok(self
            .ports
            .read()
            .map(|list| list.clone())
            .unwrap_or_else(|e| e.into_inner().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_strips_terminators() {
        let mut pending = b"12.5\r\n7\npartial".to_vec();
        assert_eq!(take_line(&mut pending).unwrap(), Some("12.5".to_string()));
        assert_eq!(take_line(&mut pending).unwrap(), Some("7".to_string()));
        assert_eq!(take_line(&mut pending).unwrap(), None);
        assert_eq!(pending, b"partial");
    }

    #[test]
    fn test_take_line_rejects_invalid_utf8() {
        let mut pending = vec![0xff, 0xfe, b'\n', b'o', b'k', b'\n'];
        assert!(take_line(&mut pending).is_err());
        assert_eq!(take_line(&mut pending).unwrap(), Some("ok".to_string()));
    }

    #[test]
    fn test_settings_apply() {
        let mut settings = SerialSettings::default();
        settings.apply(TransportOption::BaudRate(115_200)).unwrap();
        settings
            .apply(TransportOption::Timeout(Duration::from_millis(50)))
            .unwrap();
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout, Duration::from_millis(50));
        assert!(settings.apply(TransportOption::BaudRate(0)).is_err());
    }

    #[test]
    fn test_closed_serial_transport() {
        let mut transport = SerialPortTransport::new(None, SerialSettings::default());
        assert!(!transport.is_open());
        assert!(transport.open().is_err());
        assert!(matches!(transport.read_line(), Err(ScopeError::NotOpen)));
        assert!(matches!(transport.write_bytes(b"x"), Err(ScopeError::NotOpen)));
        assert!(transport.close().is_ok());
    }

    #[test]
    fn test_apply_closes_and_updates() {
        let mut transport = SerialPortTransport::with_baud_rate("/dev/null-port", 9600);
        transport.apply(TransportOption::BaudRate(57_600)).unwrap();
        assert!(!transport.is_open());
        assert_eq!(transport.settings().baud_rate, 57_600);
    }

    #[test]
    fn test_static_ports_are_shared() {
        let ports = StaticPorts::new(["COM1"]);
        let handle = ports.clone();
        handle.set(["COM1", "COM3"]);
        assert_eq!(ports.list_ports().unwrap(), vec!["COM1", "COM3"]);
    }
}

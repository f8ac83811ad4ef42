//! In-process virtual serial device
//!
//! [`virtual_pair`] returns a [`VirtualPort`] that implements [`Transport`]
//! and a [`VirtualDevice`] handle that plays the peripheral: it feeds lines,
//! records what was written, and can make opens, reads or writes fail. The
//! headless binary uses it for `--virtual` captures; tests use it to drive a
//! [`SerialLink`](super::SerialLink) without hardware.

use super::transport::{Transport, TransportOption};
use crate::error::{Result, ScopeError};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Read timeout used by virtual ports unless overridden
pub const VIRTUAL_READ_TIMEOUT: Duration = Duration::from_millis(50);

#[derive(Debug)]
struct DeviceState {
    open: bool,
    present: bool,
    fail_open: bool,
    fail_reads: bool,
    fail_writes: bool,
    written: Vec<u8>,
    open_count: usize,
    close_count: usize,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            open: false,
            present: true,
            fail_open: false,
            fail_reads: false,
            fail_writes: false,
            written: Vec::new(),
            open_count: 0,
            close_count: 0,
        }
    }
}

fn lock(state: &Mutex<DeviceState>) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Create a connected port/device pair bound to `port`
pub fn virtual_pair(port: impl Into<String>) -> (VirtualPort, VirtualDevice) {
    let (tx, rx) = unbounded();
    let state = Arc::new(Mutex::new(DeviceState::default()));
    let port = VirtualPort {
        port: Some(port.into()),
        timeout: VIRTUAL_READ_TIMEOUT,
        lines: rx,
        state: Arc::clone(&state),
    };
    let device = VirtualDevice { lines: tx, state };
    (port, device)
}

/// Host side of a virtual device
#[derive(Debug)]
pub struct VirtualPort {
    port: Option<String>,
    timeout: Duration,
    lines: Receiver<String>,
    state: Arc<Mutex<DeviceState>>,
}

impl VirtualPort {
    /// Use a different read timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Transport for VirtualPort {
    fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.open_count += 1;
        if self.port.is_none() {
            return Err(ScopeError::Transport("no port configured".to_string()));
        }
        if state.fail_open || !state.present {
            return Err(ScopeError::Transport(format!(
                "could not open {}",
                self.port.as_deref().unwrap_or_default()
            )));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        state.close_count += 1;
        state.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn read_line(&mut self) -> Result<String> {
        {
            let state = lock(&self.state);
            if !state.open {
                return Err(ScopeError::NotOpen);
            }
            if state.fail_reads {
                return Err(ScopeError::Transport("device reported a read fault".into()));
            }
        }

        match self.lines.recv_timeout(self.timeout) {
            Ok(line) => Ok(line.trim_end().to_string()),
            Err(RecvTimeoutError::Timeout) => Ok(String::new()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ScopeError::Transport("virtual device was dropped".into()))
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(ScopeError::NotOpen);
        }
        if state.fail_writes {
            return Err(ScopeError::Transport("device rejected the write".into()));
        }
        state.written.extend_from_slice(bytes);
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
        match option {
            TransportOption::Timeout(timeout) => self.timeout = timeout,
            TransportOption::BaudRate(0) => {
                return Err(ScopeError::Validation("baud rate must be non-zero".into()))
            }
            _ => {}
        }
        Ok(())
    }
}

/// Peripheral side of a virtual device
///
/// Clones control the same device.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    lines: Sender<String>,
    state: Arc<Mutex<DeviceState>>,
}

impl VirtualDevice {
    /// Queue a line for the host to read
    pub fn send_line(&self, line: impl Into<String>) -> bool {
        self.lines.send(line.into()).is_ok()
    }

    /// Make every open attempt fail
    pub fn set_fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Make every read fail
    pub fn set_fail_reads(&self, fail: bool) {
        lock(&self.state).fail_reads = fail;
    }

    /// Make every write fail
    pub fn set_fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Simulate pulling the cable: the port closes and cannot reopen
    pub fn unplug(&self) {
        let mut state = lock(&self.state);
        state.present = false;
        state.open = false;
    }

    /// Reconnect the cable after [`unplug`](Self::unplug)
    pub fn plug(&self) {
        lock(&self.state).present = true;
    }

    /// Whether the host side has the port open
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Every byte written by the host so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Written data split into lines
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of open attempts, including failed ones
    pub fn open_count(&self) -> usize {
        lock(&self.state).open_count
    }

    /// Number of close calls
    pub fn close_count(&self) -> usize {
        lock(&self.state).close_count
    }
}

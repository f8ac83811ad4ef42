//! Self-healing serial link
//!
//! A [`SerialLink`] owns one transport and a background worker thread (see
//! [`worker`](super::worker)) that keeps the connection alive, reads lines
//! and publishes them as [`LinkEvent`]s. Callers interact with the link from
//! any thread: writes, pause/resume, port changes and shutdown all go
//! through shared state guarded by mutexes and a condition variable.
//!
//! Transport faults never escape a link. They are logged with the link name
//! and retried by the worker; consumers only see them as `connection`
//! events flipping to `false`.

use super::transport::{PortEnumerator, SerialPortTransport, SerialSettings, SystemPorts};
use super::transport::{Transport, TransportOption};
use super::worker::LinkWorker;
use crate::error::{Result, ScopeError};
use crate::events::{Event, EventHub, EventName};
use crossbeam_channel::Receiver;
use serde_json::Value;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

/// Line terminator appended by [`SerialLink::write`]
pub const DEFAULT_LINE_END: &str = "\n";

/// Events published by a serial link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A non-empty line was read
    Data {
        /// Link name when payloads are tagged, `None` for raw payloads
        source: Option<String>,
        /// The line without its terminator
        line: String,
    },
    /// The connection opened or closed
    Connection {
        /// Link name when payloads are tagged, `None` for raw payloads
        source: Option<String>,
        /// New connection state
        connected: bool,
    },
    /// The set of available ports changed
    Ports(Vec<String>),
}

/// Kinds of [`LinkEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEventKind {
    /// `data`
    Data,
    /// `connection`
    Connection,
    /// `ports`
    Ports,
}

impl Event for LinkEvent {
    type Kind = LinkEventKind;

    fn kind(&self) -> LinkEventKind {
        match self {
            LinkEvent::Data { .. } => LinkEventKind::Data,
            LinkEvent::Connection { .. } => LinkEventKind::Connection,
            LinkEvent::Ports(_) => LinkEventKind::Ports,
        }
    }
}

impl EventName for LinkEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            LinkEventKind::Data => "data",
            LinkEventKind::Connection => "connection",
            LinkEventKind::Ports => "ports",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "data" => Some(LinkEventKind::Data),
            "connection" => Some(LinkEventKind::Connection),
            "ports" => Some(LinkEventKind::Ports),
            _ => None,
        }
    }
}

impl LinkEvent {
    /// Render the payload as JSON
    ///
    /// Tagged payloads become `{"<link name>": payload}`; raw payloads are
    /// the bare string, boolean or port list.
    pub fn to_json(&self) -> Value {
        let (source, payload) = match self {
            LinkEvent::Data { source, line } => (source, Value::String(line.clone())),
            LinkEvent::Connection { source, connected } => (source, Value::Bool(*connected)),
            LinkEvent::Ports(ports) => {
                return Value::Array(ports.iter().cloned().map(Value::String).collect())
            }
        };
        match source {
            Some(name) => {
                let mut map = serde_json::Map::new();
                map.insert(name.clone(), payload);
                Value::Object(map)
            }
            None => payload,
        }
    }
}

/// Tunables for a serial link
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// Pause between reconnect attempts
    pub reconnect_delay: Duration,
    /// Consecutive read failures before the transport is closed
    pub max_read_attempts: u32,
    /// Accumulated loop time between port enumerations; zero disables them
    pub ports_refresh_interval: Duration,
    /// Tag `data` and `connection` payloads with the link name
    pub emit_as_dict: bool,
    /// Whether the link's event hub delivers events at all
    pub emitter_enabled: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(1),
            max_read_attempts: 10,
            ports_refresh_interval: Duration::from_secs(1),
            emit_as_dict: true,
            emitter_enabled: true,
        }
    }
}

/// Outbound message for [`SerialLink::write`]
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Sent as-is
    Text(String),
    /// Serialized with `serde_json` before sending
    Json(Value),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        Message::Json(value)
    }
}

impl Message {
    /// Whether there is nothing to send
    pub fn is_empty(&self) -> bool {
        match self {
            Message::Text(text) => text.is_empty(),
            Message::Json(Value::Null) => true,
            Message::Json(Value::String(s)) => s.is_empty(),
            Message::Json(Value::Array(items)) => items.is_empty(),
            Message::Json(Value::Object(map)) => map.is_empty(),
            Message::Json(_) => false,
        }
    }

    /// Encode with `end` appended, or `None` for an empty message
    pub fn encode(&self, end: &str) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut text = match self {
            Message::Text(text) => text.clone(),
            Message::Json(value) => serde_json::to_string(value)?,
        };
        text.push_str(end);
        Ok(Some(text.into_bytes()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ControlState {
    running: bool,
    paused: bool,
    /// A worker has been spawned and has not finished its loop yet
    alive: bool,
    /// Thread of the live worker, once it has entered its loop
    worker: Option<ThreadId>,
    /// Bumped by every successful `begin`
    generation: u64,
}

/// Run and pause flags with a wake-up for threads waiting on them
#[derive(Debug, Default)]
pub(crate) struct ControlSignals {
    state: Mutex<ControlState>,
    wake: Condvar,
}

impl ControlSignals {
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut ControlState)) {
        f(&mut self.lock());
        self.wake.notify_all();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lock().running
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.lock().paused
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.lock().alive
    }

    /// Mark a new worker as running
    ///
    /// Waits for a worker that is already shutting down to finish. Returns
    /// false when a worker is still running, or when called from the
    /// exiting worker itself.
    pub(crate) fn begin(&self) -> bool {
        let me = thread::current().id();
        let mut state = self
            .wake
            .wait_while(self.lock(), |s| s.alive && !s.running && s.worker != Some(me))
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.alive {
            return false;
        }
        state.running = true;
        state.alive = true;
        state.worker = None;
        state.generation += 1;
        true
    }

    /// Called by the worker thread when its loop starts
    pub(crate) fn enter(&self) {
        let me = thread::current().id();
        self.update(|s| s.worker = Some(me));
    }

    /// Called by the worker thread once it will emit nothing more
    pub(crate) fn finish(&self) {
        self.update(|s| {
            s.alive = false;
            s.worker = None;
        });
    }

    /// Whether the calling thread is the live worker
    pub(crate) fn is_worker_thread(&self) -> bool {
        self.lock().worker == Some(thread::current().id())
    }

    /// Block until the worker of `generation` has finished
    ///
    /// Returns early if a newer worker has replaced it in the meantime.
    pub(crate) fn wait_finished(&self, generation: u64) {
        let _guard = self
            .wake
            .wait_while(self.lock(), |s| s.alive && s.generation == generation)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }

    /// Clear the run flag and release any pause
    ///
    /// Returns the generation of the worker that was alive, if any.
    pub(crate) fn shutdown(&self) -> Option<u64> {
        let mut live = None;
        self.update(|s| {
            live = s.alive.then_some(s.generation);
            s.running = false;
            s.paused = false;
        });
        live
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.update(|s| s.paused = paused);
    }

    /// Block while paused; returns whether the link is still running
    pub(crate) fn wait_while_paused(&self) -> bool {
        let guard = self
            .wake
            .wait_while(self.lock(), |s| s.paused && s.running)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.running
    }

    /// Sleep for `duration` unless shut down first; returns whether still running
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return self.is_running();
        }
        let (guard, _) = self
            .wake
            .wait_timeout_while(self.lock(), duration, |s| s.running)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.running
    }
}

/// State shared between a link handle and its worker thread
pub(crate) struct LinkShared {
    pub(crate) name: String,
    pub(crate) settings: LinkSettings,
    transport: Mutex<Box<dyn Transport>>,
    configured_port: Mutex<Option<String>>,
    pub(crate) ports: Box<dyn PortEnumerator>,
    pub(crate) control: ControlSignals,
    pub(crate) events: EventHub<LinkEvent>,
}

impl LinkShared {
    pub(crate) fn new(
        name: String,
        transport: Box<dyn Transport>,
        ports: Box<dyn PortEnumerator>,
        settings: LinkSettings,
    ) -> Self {
        let configured_port = transport.port();
        let events = if settings.emitter_enabled {
            EventHub::new()
        } else {
            EventHub::disabled()
        };
        Self {
            name,
            settings,
            transport: Mutex::new(transport),
            configured_port: Mutex::new(configured_port),
            ports,
            control: ControlSignals::default(),
            events,
        }
    }

    /// Lock the transport, recovering from a poisoned lock
    pub(crate) fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn configured_port(&self) -> Option<String> {
        self.configured_port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_configured_port(&self, port: Option<String>) {
        *self
            .configured_port
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = port;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.transport().is_open()
    }

    pub(crate) fn has_device(&self) -> bool {
        self.configured_port().is_some() || self.transport().port().is_some()
    }

    /// Close then reopen the transport, binding the configured port if unbound
    pub(crate) fn connect(&self) {
        let configured = self.configured_port();
        let mut transport = self.transport();

        if transport.is_open() {
            if let Err(e) = transport.close() {
                tracing::warn!(link = %self.name, error = %e, "Close before reconnect failed");
            }
        }
        if transport.port().is_none() {
            transport.set_port(configured);
        }
        match transport.open() {
            Ok(()) => tracing::debug!(link = %self.name, port = ?transport.port(), "Connected"),
            Err(e) => tracing::warn!(link = %self.name, error = %e, "Connect failed"),
        }
    }

    /// Close the transport, logging failures
    pub(crate) fn close_transport(&self) {
        if let Err(e) = self.transport().close() {
            tracing::warn!(link = %self.name, error = %e, "Close failed");
        }
    }

    fn tag(&self) -> Option<String> {
        self.settings.emit_as_dict.then(|| self.name.clone())
    }

    pub(crate) fn emit_data(&self, line: String) {
        self.events.emit(&LinkEvent::Data {
            source: self.tag(),
            line,
        });
    }

    pub(crate) fn emit_connection(&self, connected: bool) {
        self.events.emit(&LinkEvent::Connection {
            source: self.tag(),
            connected,
        });
    }

    pub(crate) fn emit_ports(&self, ports: Vec<String>) {
        self.events.emit(&LinkEvent::Ports(ports));
    }
}

/// A serial connection with its own reconnecting reader thread
pub struct SerialLink {
    shared: Arc<LinkShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("name", &self.shared.name)
            .field("settings", &self.shared.settings)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SerialLink {
    /// Create an idle link over `transport`, enumerating system ports
    ///
    /// The transport's current port becomes the configured port.
    pub fn new(
        name: impl Into<String>,
        transport: impl Transport + 'static,
        settings: LinkSettings,
    ) -> Self {
        Self::with_enumerator(name, transport, SystemPorts, settings)
    }

    /// Create an idle link with a custom port enumerator
    pub fn with_enumerator(
        name: impl Into<String>,
        transport: impl Transport + 'static,
        ports: impl PortEnumerator + 'static,
        settings: LinkSettings,
    ) -> Self {
        Self::from_parts(name.into(), Box::new(transport), Box::new(ports), settings)
    }

    pub(crate) fn from_parts(
        name: String,
        transport: Box<dyn Transport>,
        ports: Box<dyn PortEnumerator>,
        settings: LinkSettings,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared::new(name, transport, ports, settings)),
            worker: Mutex::new(None),
        }
    }

    /// Create an idle link on an operating system serial port
    pub fn serial(
        name: impl Into<String>,
        port: Option<String>,
        serial: SerialSettings,
        settings: LinkSettings,
    ) -> Self {
        Self::new(name, SerialPortTransport::new(port, serial), settings)
    }

    /// Link name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Link tunables
    pub fn settings(&self) -> &LinkSettings {
        &self.shared.settings
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Spawn the worker thread
    ///
    /// Fails if the worker is already running. A stopped link may be
    /// started again; a worker that is still shutting down is waited for
    /// first.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.lock_worker();
        if !self.shared.control.begin() {
            return Err(ScopeError::AlreadyRunning(self.shared.name.clone()));
        }
        if let Some(stale) = worker.take() {
            let _ = stale.join();
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("link-{}", self.shared.name))
            .spawn(move || LinkWorker::new(shared).run());

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                tracing::info!(link = %self.shared.name, "Link started");
                Ok(())
            }
            Err(e) => {
                self.shared.control.shutdown();
                self.shared.control.finish();
                Err(ScopeError::ThreadSpawn(e.to_string()))
            }
        }
    }

    /// Stop the worker and close the connection
    ///
    /// Blocks until the worker has left its loop, so no event fires after
    /// this returns, whichever thread calls it and however many call it at
    /// once. The configured port is kept for a later `start`.
    pub fn stop(&self) {
        let live = self.shared.control.shutdown();

        if self.shared.control.is_worker_thread() {
            tracing::warn!(
                link = %self.shared.name,
                "stop called from the link's own worker; not waiting"
            );
        } else {
            if let Some(generation) = live {
                self.shared.control.wait_finished(generation);
            }
            self.join_finished_worker();
        }

        self.disconnect(false);
        if live.is_some() {
            tracing::info!(link = %self.shared.name, "Link stopped");
        }
    }

    /// Join the worker handle unless a newer worker has been started
    fn join_finished_worker(&self) {
        let mut worker = self.lock_worker();
        if self.shared.control.is_alive() {
            return;
        }
        if let Some(handle) = worker.take() {
            if handle.join().is_err() {
                tracing::error!(link = %self.shared.name, "Link worker panicked");
            }
        }
    }

    /// Whether the worker thread is running
    pub fn is_running(&self) -> bool {
        self.shared.control.is_running()
    }

    /// Suspend reading after the current loop iteration
    pub fn pause(&self) {
        self.shared.control.set_paused(true);
    }

    /// Resume a paused link
    pub fn resume(&self) {
        self.shared.control.set_paused(false);
    }

    /// Pause (`true`) or resume (`false`)
    pub fn set_pause(&self, paused: bool) {
        self.shared.control.set_paused(paused);
    }

    /// Whether the link is paused
    pub fn is_paused(&self) -> bool {
        self.shared.control.is_paused()
    }

    /// Whether the transport is open
    ///
    /// May wait for an in-flight read to finish.
    pub fn is_connected(&self) -> bool {
        self.shared.is_open()
    }

    /// Port the transport is currently bound to
    pub fn port(&self) -> Option<String> {
        self.shared.transport().port()
    }

    /// Port the link reconnects to
    pub fn configured_port(&self) -> Option<String> {
        self.shared.configured_port()
    }

    /// Bind the transport to `port` and connect
    ///
    /// The configured port is unchanged; see [`restore_port`](Self::restore_port).
    pub fn set_port(&self, port: impl Into<String>) {
        let port = port.into();
        {
            let mut transport = self.shared.transport();
            if let Err(e) = transport.close() {
                tracing::warn!(link = %self.shared.name, error = %e, "Close failed");
            }
            transport.set_port(Some(port));
        }
        self.shared.connect();
    }

    /// Rebind the configured port and connect
    pub fn restore_port(&self) {
        if let Some(port) = self.shared.configured_port() {
            self.set_port(port);
        }
    }

    /// Close the transport and unbind its port
    ///
    /// Without `force` the worker reconnects to the configured port on its
    /// next iteration; with `force` the configured port is forgotten too.
    pub fn disconnect(&self, force: bool) {
        {
            let mut transport = self.shared.transport();
            if transport.port().is_some() {
                if let Err(e) = transport.close() {
                    tracing::warn!(link = %self.shared.name, error = %e, "Close failed");
                }
                transport.set_port(None);
            }
        }
        if force {
            self.shared.set_configured_port(None);
        }
    }

    /// Whether a port is configured or bound
    pub fn has_device(&self) -> bool {
        self.shared.has_device()
    }

    /// Write `message` followed by a newline
    pub fn write(&self, message: impl Into<Message>) -> bool {
        self.write_with_end(message, DEFAULT_LINE_END)
    }

    /// Write `message` followed by `end`
    ///
    /// Returns whether bytes were written. Empty messages and writes while
    /// disconnected are skipped; write failures are logged.
    pub fn write_with_end(&self, message: impl Into<Message>, end: &str) -> bool {
        let bytes = match message.into().encode(end) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(link = %self.shared.name, error = %e, "Could not encode message");
                return false;
            }
        };

        let mut transport = self.shared.transport();
        if !transport.is_open() {
            return false;
        }
        match transport.write_bytes(&bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(link = %self.shared.name, error = %e, "Write failed");
                false
            }
        }
    }

    /// Close the transport and change one connection option
    ///
    /// The link stays disconnected until the worker reconnects or the
    /// caller calls [`set_port`](Self::set_port).
    pub fn reconfigure(&self, option: TransportOption) -> Result<()> {
        self.shared.transport().apply(option)
    }

    /// Ports reported by this link's enumerator; empty on failure
    pub fn available_ports(&self) -> Vec<String> {
        self.shared.ports.list_ports().unwrap_or_else(|e| {
            tracing::warn!(link = %self.shared.name, error = %e, "Port enumeration failed");
            Vec::new()
        })
    }

    /// The link's event hub
    pub fn events(&self) -> &EventHub<LinkEvent> {
        &self.shared.events
    }

    /// Register an event handler
    pub fn on<F>(&self, kind: LinkEventKind, handler: F)
    where
        F: Fn(&LinkEvent) + Send + Sync + 'static,
    {
        self.shared.events.on(kind, handler);
    }

    /// Register a handler that ignores the payload
    pub fn on_signal<F>(&self, kind: LinkEventKind, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.events.on_signal(kind, handler);
    }

    /// Receive events of `kind` through a channel
    pub fn subscribe_channel(&self, kind: LinkEventKind) -> Receiver<LinkEvent> {
        self.shared.events.subscribe_channel(kind)
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        let has_worker = self
            .worker
            .get_mut()
            .map(|w| w.is_some())
            .unwrap_or_else(|poisoned| poisoned.into_inner().is_some());
        if has_worker {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::transport::StaticPorts;
    use crate::serial::virtual_port::virtual_pair;
    use serde_json::json;

    fn quiet_settings() -> LinkSettings {
        LinkSettings {
            reconnect_delay: Duration::from_millis(10),
            ports_refresh_interval: Duration::ZERO,
            ..LinkSettings::default()
        }
    }

    #[test]
    fn test_event_kind_names() {
        for kind in [LinkEventKind::Data, LinkEventKind::Connection, LinkEventKind::Ports] {
            assert_eq!(LinkEventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(LinkEventKind::from_name("full"), None);
    }

    #[test]
    fn test_event_json_forms() {
        let tagged = LinkEvent::Data {
            source: Some("arduino".into()),
            line: "42".into(),
        };
        assert_eq!(tagged.to_json(), json!({"arduino": "42"}));

        let raw = LinkEvent::Connection {
            source: None,
            connected: false,
        };
        assert_eq!(raw.to_json(), json!(false));

        let ports = LinkEvent::Ports(vec!["COM1".into()]);
        assert_eq!(ports.to_json(), json!(["COM1"]));
    }

    #[test]
    fn test_message_encoding() {
        assert_eq!(Message::from("").encode("\n").unwrap(), None);
        assert_eq!(Message::from(json!({})).encode("\n").unwrap(), None);
        assert_eq!(
            Message::from("led on").encode("\r\n").unwrap(),
            Some(b"led on\r\n".to_vec())
        );
        assert_eq!(
            Message::from(json!({"led": 1})).encode("\n").unwrap(),
            Some(b"{\"led\":1}\n".to_vec())
        );
    }

    #[test]
    fn test_control_sleep_returns_early_on_shutdown() {
        let control = Arc::new(ControlSignals::default());
        assert!(control.begin());

        let sleeper = Arc::clone(&control);
        let handle = thread::spawn(move || sleeper.sleep(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        control.shutdown();

        assert!(!handle.join().unwrap());
    }

    #[test]
    fn test_begin_waits_for_exiting_worker() {
        let control = Arc::new(ControlSignals::default());
        assert!(control.begin());
        assert!(!control.begin());

        assert_eq!(control.shutdown(), Some(1));
        let exiting = Arc::clone(&control);
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            exiting.finish();
        });

        // Blocks until the old worker finishes, then claims the slot.
        assert!(control.begin());
        assert!(control.is_alive());
        assert!(control.is_running());
        worker.join().unwrap();
    }

    #[test]
    fn test_wait_finished_without_worker_returns() {
        let control = ControlSignals::default();
        assert_eq!(control.shutdown(), None);
        control.wait_finished(0);
        assert!(!control.is_worker_thread());
    }

    #[test]
    fn test_write_skips_when_closed_or_empty() {
        let (port, device) = virtual_pair("VCOM1");
        let link = SerialLink::with_enumerator("dev", port, StaticPorts::default(), quiet_settings());

        assert!(!link.write("hello"));
        link.set_port("VCOM1");
        assert!(link.is_connected());
        assert!(!link.write(""));
        assert!(link.write("hello"));
        assert!(link.write(json!({"cmd": "go"})));
        assert!(link.write_with_end("x", ";"));

        assert_eq!(device.written(), b"hello\n{\"cmd\":\"go\"}\nx;".to_vec());
    }

    #[test]
    fn test_write_fault_is_swallowed() {
        let (port, device) = virtual_pair("VCOM1");
        let link = SerialLink::with_enumerator("dev", port, StaticPorts::default(), quiet_settings());
        link.set_port("VCOM1");
        device.set_fail_writes(true);
        assert!(!link.write("data"));
    }

    #[test]
    fn test_disconnect_and_restore() {
        let (port, _device) = virtual_pair("VCOM1");
        let link = SerialLink::with_enumerator("dev", port, StaticPorts::default(), quiet_settings());
        assert_eq!(link.configured_port().as_deref(), Some("VCOM1"));

        link.restore_port();
        assert!(link.is_connected());

        link.disconnect(false);
        assert!(!link.is_connected());
        assert_eq!(link.port(), None);
        assert!(link.has_device());

        link.restore_port();
        assert_eq!(link.port().as_deref(), Some("VCOM1"));

        link.disconnect(true);
        assert_eq!(link.configured_port(), None);
        assert!(!link.has_device());
    }

    #[test]
    fn test_reconfigure_leaves_link_closed() {
        let (port, _device) = virtual_pair("VCOM1");
        let link = SerialLink::with_enumerator("dev", port, StaticPorts::default(), quiet_settings());
        link.restore_port();
        assert!(link.is_connected());

        link.reconfigure(TransportOption::BaudRate(115_200)).unwrap();
        assert!(!link.is_connected());
        assert!(link.reconfigure(TransportOption::BaudRate(0)).is_err());
    }

    #[test]
    fn test_start_twice_is_rejected_and_restart_works() {
        let (port, _device) = virtual_pair("VCOM1");
        let link = SerialLink::with_enumerator("dev", port, StaticPorts::default(), quiet_settings());

        link.start().unwrap();
        assert!(matches!(link.start(), Err(ScopeError::AlreadyRunning(_))));
        link.stop();
        assert!(!link.is_running());

        link.start().unwrap();
        assert!(link.is_running());
        link.stop();
    }

    #[test]
    fn test_available_ports_uses_enumerator() {
        let (port, _device) = virtual_pair("VCOM1");
        let ports = StaticPorts::new(["VCOM1", "VCOM2"]);
        let link = SerialLink::with_enumerator("dev", port, ports, quiet_settings());
        assert_eq!(link.available_ports(), vec!["VCOM1", "VCOM2"]);
    }
}

//! Link worker thread
//!
//! Each running [`SerialLink`](super::SerialLink) owns one worker. Every
//! iteration of its loop:
//!
//! 1. emits `connection` if the open state changed since the last iteration
//! 2. reads one line while connected, or reconnects and sleeps while not
//! 3. re-enumerates ports once enough loop time has accumulated
//! 4. blocks while the link is paused
//!
//! Transport errors are logged and counted here; they never end the loop.
//! Only clearing the run flag does.

use super::link::LinkShared;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Releases `stop` callers when the worker leaves its loop, even by panic
struct FinishGuard(Arc<LinkShared>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.control.finish();
    }
}

/// The loop body of a serial link
pub(crate) struct LinkWorker {
    shared: Arc<LinkShared>,
    /// Connection state as of the last emitted `connection` event
    last_connection_state: bool,
    /// Consecutive failed reads
    read_attempts: u32,
    /// Loop time accumulated since the last port enumeration
    elapsed_since_refresh: Duration,
    /// Port list as of the last emitted `ports` event
    last_ports: Vec<String>,
}

impl LinkWorker {
    pub(crate) fn new(shared: Arc<LinkShared>) -> Self {
        Self {
            shared,
            last_connection_state: false,
            read_attempts: 0,
            elapsed_since_refresh: Duration::ZERO,
            last_ports: Vec::new(),
        }
    }

    /// Run until the link's run flag is cleared
    pub(crate) fn run(&mut self) {
        let _finished = FinishGuard(Arc::clone(&self.shared));
        self.shared.control.enter();
        tracing::info!(link = %self.shared.name, "Link worker started");

        while self.shared.control.is_running() {
            self.tick();
            if !self.shared.control.wait_while_paused() {
                break;
            }
        }

        tracing::info!(link = %self.shared.name, "Link worker stopped");
    }

    /// One loop iteration, without the pause point
    pub(crate) fn tick(&mut self) {
        let started = Instant::now();

        self.check_connection_status();
        if self.shared.is_open() {
            self.read_data();
        } else {
            self.reconnect();
        }

        self.check_ports(started.elapsed());
    }

    fn check_connection_status(&mut self) {
        let connected = self.shared.is_open();
        if connected != self.last_connection_state {
            self.last_connection_state = connected;
            tracing::debug!(link = %self.shared.name, connected, "Connection changed");
            self.shared.emit_connection(connected);
        }
    }

    fn read_data(&mut self) {
        // The transport lock is released before emitting so handlers can write.
        let result = self.shared.transport().read_line();

        match result {
            Ok(line) => {
                self.read_attempts = 0;
                if !line.is_empty() {
                    self.shared.emit_data(line);
                }
            }
            Err(e) => {
                self.read_attempts += 1;
                tracing::warn!(
                    link = %self.shared.name,
                    attempt = self.read_attempts,
                    error = %e,
                    "Read failed"
                );
                if self.read_attempts >= self.shared.settings.max_read_attempts.max(1) {
                    tracing::warn!(link = %self.shared.name, "Too many read failures, closing");
                    self.shared.close_transport();
                    self.read_attempts = 0;
                }
            }
        }
    }

    fn reconnect(&mut self) {
        if self.shared.has_device() {
            self.shared.connect();
        }
        self.shared.control.sleep(self.shared.settings.reconnect_delay);
    }

    fn check_ports(&mut self, dt: Duration) {
        let interval = self.shared.settings.ports_refresh_interval;
        if interval.is_zero() {
            return;
        }

        self.elapsed_since_refresh += dt;
        if self.elapsed_since_refresh < interval {
            return;
        }
        self.elapsed_since_refresh = Duration::ZERO;

        match self.shared.ports.list_ports() {
            Ok(ports) if ports != self.last_ports => {
                tracing::debug!(link = %self.shared.name, ?ports, "Ports changed");
                self.last_ports = ports.clone();
                self.shared.emit_ports(ports);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(link = %self.shared.name, error = %e, "Port enumeration failed")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScopeError;
    use crate::serial::link::{LinkEvent, LinkEventKind, LinkSettings};
    use crate::serial::transport::{MockPortEnumerator, MockTransport, StaticPorts};
    use crate::serial::virtual_port::virtual_pair;

    fn settings(max_read_attempts: u32) -> LinkSettings {
        LinkSettings {
            reconnect_delay: Duration::ZERO,
            max_read_attempts,
            ports_refresh_interval: Duration::ZERO,
            ..LinkSettings::default()
        }
    }

    fn shared_with(
        transport: impl crate::serial::Transport + 'static,
        ports: impl crate::serial::PortEnumerator + 'static,
        settings: LinkSettings,
    ) -> Arc<LinkShared> {
        Arc::new(LinkShared::new(
            "dev".to_string(),
            Box::new(transport),
            Box::new(ports),
            settings,
        ))
    }

    #[test]
    fn test_read_failures_close_after_limit() {
        let mut transport = MockTransport::new();
        transport.expect_port().return_const(Some("COM7".to_string()));
        transport.expect_is_open().return_const(true);
        transport
            .expect_read_line()
            .times(3)
            .returning(|| Err(ScopeError::Transport("framing error".into())));
        transport.expect_close().times(1).returning(|| Ok(()));

        let shared = shared_with(transport, MockPortEnumerator::new(), settings(3));
        let mut worker = LinkWorker::new(shared);

        worker.tick();
        worker.tick();
        assert_eq!(worker.read_attempts, 2);
        worker.tick();
        assert_eq!(worker.read_attempts, 0);
    }

    #[test]
    fn test_successful_read_resets_attempts() {
        let mut transport = MockTransport::new();
        transport.expect_port().return_const(Some("COM7".to_string()));
        transport.expect_is_open().return_const(true);
        let mut calls = 0;
        transport.expect_read_line().times(3).returning(move || {
            calls += 1;
            match calls {
                2 => Ok("5".to_string()),
                _ => Err(ScopeError::Transport("noise".into())),
            }
        });
        transport.expect_close().never();

        let shared = shared_with(transport, MockPortEnumerator::new(), settings(2));
        let mut worker = LinkWorker::new(shared);
        for _ in 0..3 {
            worker.tick();
        }
        assert_eq!(worker.read_attempts, 1);
    }

    #[test]
    fn test_open_failure_never_ends_loop() {
        let mut transport = MockTransport::new();
        transport.expect_port().return_const(Some("COM7".to_string()));
        transport.expect_is_open().return_const(false);
        transport.expect_set_port().never();
        transport
            .expect_open()
            .times(5)
            .returning(|| Err(ScopeError::Transport("access denied".into())));

        let shared = shared_with(transport, MockPortEnumerator::new(), settings(3));
        let connections = shared.events.subscribe_channel(LinkEventKind::Connection);
        let mut worker = LinkWorker::new(Arc::clone(&shared));
        for _ in 0..5 {
            worker.tick();
        }
        assert!(connections.try_recv().is_err());
    }

    #[test]
    fn test_connection_event_once_per_transition() {
        let (port, device) = virtual_pair("VCOM2");
        let port = port.with_timeout(Duration::from_millis(1));
        let shared = shared_with(port, StaticPorts::default(), settings(2));
        let events = shared.events.subscribe_channel(LinkEventKind::Connection);
        let mut worker = LinkWorker::new(Arc::clone(&shared));

        // closed -> reconnect
        worker.tick();
        assert!(events.try_recv().is_err());

        for _ in 0..3 {
            worker.tick();
        }
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![LinkEvent::Connection {
                source: Some("dev".into()),
                connected: true
            }]
        );

        device.set_fail_reads(true);
        worker.tick();
        worker.tick();
        assert!(!shared.is_open());
        device.set_fail_reads(false);
        device.set_fail_open(true);
        for _ in 0..3 {
            worker.tick();
        }
        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![LinkEvent::Connection {
                source: Some("dev".into()),
                connected: false
            }]
        );
    }

    #[test]
    fn test_data_is_tagged_or_raw() {
        for emit_as_dict in [true, false] {
            let (port, device) = virtual_pair("VCOM3");
            let port = port.with_timeout(Duration::from_millis(1));
            let settings = LinkSettings {
                emit_as_dict,
                ..settings(3)
            };
            let shared = shared_with(port, StaticPorts::default(), settings);
            let data = shared.events.subscribe_channel(LinkEventKind::Data);
            let mut worker = LinkWorker::new(shared);

            worker.tick();
            device.send_line("");
            device.send_line("3.14");
            worker.tick();
            worker.tick();

            let expected_source = emit_as_dict.then(|| "dev".to_string());
            assert_eq!(
                data.try_iter().collect::<Vec<_>>(),
                vec![LinkEvent::Data {
                    source: expected_source,
                    line: "3.14".into()
                }]
            );
        }
    }

    #[test]
    fn test_ports_emitted_only_on_change() {
        let mut ports = MockPortEnumerator::new();
        let mut calls = 0;
        ports.expect_list_ports().times(3).returning(move || {
            calls += 1;
            Ok(match calls {
                1 | 2 => vec!["COM1".to_string()],
                _ => vec!["COM1".to_string(), "COM4".to_string()],
            })
        });

        let (port, _device) = virtual_pair("VCOM4");
        let settings = LinkSettings {
            ports_refresh_interval: Duration::from_millis(100),
            ..settings(3)
        };
        let shared = shared_with(port, ports, settings);
        let events = shared.events.subscribe_channel(LinkEventKind::Ports);
        let mut worker = LinkWorker::new(shared);

        // Accumulated time below the interval does not enumerate.
        worker.check_ports(Duration::from_millis(40));
        worker.check_ports(Duration::from_millis(40));
        assert!(events.try_recv().is_err());
        worker.check_ports(Duration::from_millis(40));
        assert_eq!(worker.elapsed_since_refresh, Duration::ZERO);
        worker.check_ports(Duration::from_millis(100));
        worker.check_ports(Duration::from_millis(100));

        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                LinkEvent::Ports(vec!["COM1".into()]),
                LinkEvent::Ports(vec!["COM1".into(), "COM4".into()]),
            ]
        );
    }
}

//! Test data builders for creating test objects

use serialscope::serial::{
    virtual_pair, LinkSettings, SerialLink, StaticPorts, VirtualDevice,
};
use serialscope::RingSignalBuffer;
use std::time::Duration;

/// A link wired to a virtual device, plus the handles that drive it
pub struct TestLink {
    pub link: SerialLink,
    pub device: VirtualDevice,
    pub ports: StaticPorts,
}

/// Builder for serial links over a virtual device
pub struct LinkBuilder {
    name: String,
    port: String,
    settings: LinkSettings,
    read_timeout: Duration,
    ports: Vec<String>,
}

impl LinkBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            port: format!("VCOM-{}", name),
            settings: LinkSettings {
                reconnect_delay: Duration::from_millis(10),
                ports_refresh_interval: Duration::ZERO,
                ..LinkSettings::default()
            },
            read_timeout: Duration::from_millis(5),
            ports: Vec::new(),
        }
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.settings.reconnect_delay = delay;
        self
    }

    pub fn max_read_attempts(mut self, attempts: u32) -> Self {
        self.settings.max_read_attempts = attempts;
        self
    }

    pub fn ports_refresh(mut self, interval: Duration) -> Self {
        self.settings.ports_refresh_interval = interval;
        self
    }

    pub fn emit_as_dict(mut self, enabled: bool) -> Self {
        self.settings.emit_as_dict = enabled;
        self
    }

    pub fn emitter_enabled(mut self, enabled: bool) -> Self {
        self.settings.emitter_enabled = enabled;
        self
    }

    pub fn ports(mut self, ports: &[&str]) -> Self {
        self.ports = ports.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn build(self) -> TestLink {
        let (port, device) = virtual_pair(self.port);
        let port = port.with_timeout(self.read_timeout);
        let ports = StaticPorts::new(self.ports);
        let link = SerialLink::with_enumerator(self.name, port, ports.clone(), self.settings);
        TestLink { link, device, ports }
    }
}

/// Builder for ring buffers
pub struct BufferBuilder {
    name: String,
    capacity: usize,
    timed: bool,
    auto_clear: bool,
}

impl BufferBuilder {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            timed: false,
            auto_clear: false,
        }
    }

    pub fn timed(mut self) -> Self {
        self.timed = true;
        self
    }

    pub fn auto_clear(mut self) -> Self {
        self.auto_clear = true;
        self
    }

    pub fn build(self) -> RingSignalBuffer {
        let buffer = RingSignalBuffer::new(self.name, self.capacity)
            .expect("valid test buffer")
            .with_auto_clear(self.auto_clear);
        if self.timed {
            buffer.with_time()
        } else {
            buffer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_builder() {
        let buffer = BufferBuilder::new("x", 8).timed().auto_clear().build();

        assert_eq!(buffer.name(), "x");
        assert_eq!(buffer.capacity(), 8);
        assert!(buffer.is_timed());
        assert!(buffer.auto_clear_on_full());
    }
}

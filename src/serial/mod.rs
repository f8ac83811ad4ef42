//! Serial links
//!
//! This module keeps line-oriented connections to serial peripherals alive
//! on background threads and publishes what they send as events.
//!
//! # Components
//!
//! - [`Transport`] / [`PortEnumerator`] - the connection and port-listing seams
//! - [`SerialPortTransport`] / [`SystemPorts`] - real hardware via `serialport`
//! - [`VirtualPort`] / [`VirtualDevice`] - an in-process device for tests and demos
//! - [`SerialLink`] - one connection plus its reconnecting worker thread
//! - [`SerialLinkPool`] - named links driven together
//!
//! # Example
//!
//! ```ignore
//! use serialscope::serial::{LinkEvent, LinkEventKind, LinkSettings, SerialLink, SerialSettings};
//!
//! let link = SerialLink::serial(
//!     "arduino",
//!     Some("/dev/ttyACM0".to_string()),
//!     SerialSettings::default(),
//!     LinkSettings::default(),
//! );
//! link.on(LinkEventKind::Data, |event| {
//!     if let LinkEvent::Data { line, .. } = event {
//!         println!("{}", line);
//!     }
//! });
//! link.start()?;
//! link.write("led on");
//! link.stop();
//! ```

pub mod link;
pub mod pool;
pub mod transport;
pub mod virtual_port;
mod worker;

pub use link::{LinkEvent, LinkEventKind, LinkSettings, Message, SerialLink, DEFAULT_LINE_END};
pub use pool::SerialLinkPool;
pub use transport::{
    PortEnumerator, SerialPortTransport, SerialSettings, StaticPorts, SystemPorts, Transport,
    TransportOption, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT,
};
pub use virtual_port::{virtual_pair, VirtualDevice, VirtualPort, VIRTUAL_READ_TIMEOUT};

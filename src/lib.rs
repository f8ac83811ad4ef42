//! # serialscope: self-healing serial links with bounded signal buffers
//!
//! A serial client for microcontroller-style peripherals that keeps its
//! connection alive on a background thread, tolerates unplugs and read
//! errors, watches for ports appearing and disappearing, and publishes
//! everything it sees as events. Incoming samples land in fixed-capacity
//! ring buffers that announce when they are (nearly) full so a consumer can
//! drain, plot or export them.
//!
//! ## Architecture
//!
//! - **Events**: [`events::EventHub`] is embedded by every observable type
//! - **Buffers**: [`buffer::RingSignalBuffer`] and [`buffer::MultiSignalRegistry`]
//!   with CSV import/export
//! - **Serial**: [`serial::SerialLink`] (one port plus its worker thread) and
//!   [`serial::SerialLinkPool`] (named links driven together)
//! - **Timing**: [`timing`] helpers for throttling consumers
//!
//! Transport faults are logged through `tracing` and retried; only setup
//! mistakes (bad names, capacities, files, configuration) surface as
//! [`ScopeError`]s.
//!
//! ## Example
//!
//! ```ignore
//! use serialscope::buffer::MultiSignalRegistry;
//! use serialscope::serial::{LinkEvent, LinkEventKind, LinkSettings, SerialLink, SerialSettings};
//! use std::sync::{Arc, Mutex};
//!
//! let registry = Arc::new(Mutex::new(MultiSignalRegistry::new(["value"], 500, true)?));
//! let link = SerialLink::serial(
//!     "arduino",
//!     Some("/dev/ttyACM0".into()),
//!     SerialSettings::default(),
//!     LinkSettings::default(),
//! );
//!
//! let sink = Arc::clone(&registry);
//! link.on(LinkEventKind::Data, move |event| {
//!     if let LinkEvent::Data { line, .. } = event {
//!         if let Ok(value) = line.parse::<f64>() {
//!             sink.lock().unwrap().append_all([("value", value)]);
//!         }
//!     }
//! });
//! link.start()?;
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod serial;
pub mod timing;

// Re-export commonly used types
pub use buffer::{BufferEvent, BufferEventKind, MultiSignalRegistry, RingSignalBuffer};
pub use config::AppConfig;
pub use error::{Result, ResultExt, ScopeError};
pub use events::{Event, EventHub, EventName};
pub use serial::{LinkEvent, LinkEventKind, SerialLink, SerialLinkPool};
pub use timing::{SamplerTimeCounter, TimerCount};

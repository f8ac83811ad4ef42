//! Bounded signal buffers
//!
//! - [`RingSignalBuffer`] - fixed-capacity storage for one named signal with
//!   an early `full` notification and optional auto-clear
//! - [`MultiSignalRegistry`] - a set of buffers sharing one capacity and an
//!   optional time axis
//! - [`persist`] - CSV import/export shared by both
//!
//! # Example
//!
//! ```ignore
//! use serialscope::buffer::{BufferEvent, BufferEventKind, RingSignalBuffer};
//!
//! let mut buffer = RingSignalBuffer::new("voltage", 200)?.with_auto_clear(true);
//! buffer.on(BufferEventKind::Full, |event| {
//!     let BufferEvent::Full { values, .. } = event;
//!     println!("window of {} samples", values.len());
//! });
//! buffer.append(3.3);
//! ```

pub mod persist;
pub mod registry;
pub mod ring;

pub use persist::{Column, TIME_COLUMN};
pub use registry::{BatchReport, MultiSignalRegistry};
pub use ring::{BufferEvent, BufferEventKind, RingSignalBuffer, DEFAULT_CAPACITY};

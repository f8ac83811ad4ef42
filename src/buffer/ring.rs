//! Bounded ring buffer for a single named signal
//!
//! A [`RingSignalBuffer`] keeps the newest `capacity` samples of one scalar
//! signal, optionally paired with the elapsed time between samples. When
//! the number of held samples first reaches `capacity - 1` the buffer
//! emits [`BufferEvent::Full`] with a snapshot of its contents; with
//! auto-clear enabled it then empties itself so that the consumer receives
//! each window exactly once.
//!
//! # Early full warning
//!
//! The full notification fires one slot *before* nominal capacity. A
//! consumer draining on `full` therefore still has one free slot before a
//! concurrent producer starts overwriting the oldest sample. A buffer of
//! capacity 1 reports full at 1 sample.

use crate::buffer::persist::{self, TIME_COLUMN};
use crate::error::{Result, ScopeError};
use crate::events::{Event, EventHub, EventName};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

/// Default number of samples held by a buffer
pub const DEFAULT_CAPACITY: usize = 1000;

/// Events published by a signal buffer
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    /// The buffer reached its full threshold
    Full {
        /// Name of the buffer
        name: String,
        /// Snapshot of the held samples, oldest first
        values: Vec<f64>,
        /// Snapshot of the sample intervals, when the buffer is timed
        timestamps: Option<Vec<f64>>,
    },
}

/// Kinds of [`BufferEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferEventKind {
    /// See [`BufferEvent::Full`]
    Full,
}

impl Event for BufferEvent {
    type Kind = BufferEventKind;

    fn kind(&self) -> BufferEventKind {
        match self {
            BufferEvent::Full { .. } => BufferEventKind::Full,
        }
    }
}

impl EventName for BufferEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            BufferEventKind::Full => "full",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "full" => Some(BufferEventKind::Full),
            _ => None,
        }
    }
}

/// Validate a signal name and capacity
pub(crate) fn validate(name: &str, capacity: usize) -> Result<()> {
    if name == TIME_COLUMN {
        return Err(ScopeError::ReservedName(name.to_string()));
    }
    if name.is_empty() {
        return Err(ScopeError::Validation(
            "signal name must not be empty".to_string(),
        ));
    }
    if capacity == 0 {
        return Err(ScopeError::InvalidCapacity(capacity));
    }
    Ok(())
}

/// Fixed-capacity, insertion-ordered storage for one signal
#[derive(Debug)]
pub struct RingSignalBuffer {
    name: String,
    capacity: usize,
    default_capacity: usize,
    values: VecDeque<f64>,
    /// Seconds elapsed since the previous sample; present in timed mode
    timestamps: Option<VecDeque<f64>>,
    last_append: Option<Instant>,
    auto_clear_on_full: bool,
    events: EventHub<BufferEvent>,
}

impl RingSignalBuffer {
    /// Create an untimed buffer
    ///
    /// Fails if `name` is `"t"` (reserved for the time axis) or empty, or if
    /// `capacity` is zero.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let name = name.into();
        validate(&name, capacity)?;

        Ok(Self {
            name,
            capacity,
            default_capacity: capacity,
            values: VecDeque::with_capacity(capacity),
            timestamps: None,
            last_append: None,
            auto_clear_on_full: false,
            events: EventHub::new(),
        })
    }

    /// Record the interval between consecutive samples
    pub fn with_time(mut self) -> Self {
        self.timestamps = Some(VecDeque::with_capacity(self.capacity));
        self.values.clear();
        self.last_append = None;
        self
    }

    /// Empty the buffer right after every full notification
    pub fn with_auto_clear(mut self, enabled: bool) -> Self {
        self.auto_clear_on_full = enabled;
        self
    }

    /// Use a disabled event hub (no `full` notifications)
    pub fn without_events(self) -> Self {
        self.events.set_enabled(false);
        self
    }

    /// Buffer name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current maximum number of samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Capacity restored by [`reset`](Self::reset)
    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    /// Number of samples held
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no samples are held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the buffer records sample intervals
    pub fn is_timed(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Whether the buffer empties itself after each full notification
    pub fn auto_clear_on_full(&self) -> bool {
        self.auto_clear_on_full
    }

    /// Change the auto-clear policy
    pub fn set_auto_clear_on_full(&mut self, enabled: bool) {
        self.auto_clear_on_full = enabled;
    }

    /// Number of held samples at which `full` fires
    pub fn full_threshold(&self) -> usize {
        self.capacity.saturating_sub(1).max(1)
    }

    /// Whether the full threshold has been reached
    pub fn is_full(&self) -> bool {
        self.values.len() >= self.full_threshold()
    }

    /// Held samples, oldest first
    pub fn data(&self) -> &VecDeque<f64> {
        &self.values
    }

    /// Copy of the held samples, oldest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    /// Sample intervals in seconds, when timed
    pub fn timestamps(&self) -> Option<&VecDeque<f64>> {
        self.timestamps.as_ref()
    }

    /// Elapsed seconds of each held sample relative to the oldest one
    pub fn time_axis(&self) -> Option<Vec<f64>> {
        self.timestamps
            .as_ref()
            .map(|ts| persist::cumulative_from_intervals(ts.iter()))
    }

    /// Event hub for `full` notifications
    pub fn events(&self) -> &EventHub<BufferEvent> {
        &self.events
    }

    /// Register a handler for buffer events
    pub fn on<F>(&self, kind: BufferEventKind, handler: F)
    where
        F: Fn(&BufferEvent) + Send + Sync + 'static,
    {
        self.events.on(kind, handler);
    }

    /// Register a payload-less handler for buffer events
    pub fn on_signal<F>(&self, kind: BufferEventKind, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.on_signal(kind, handler);
    }

    /// Push a sample, evicting the oldest one when at capacity
    pub fn append(&mut self, value: f64) {
        let now = Instant::now();
        let previous_len = self.values.len();

        if self.values.len() >= self.capacity {
            self.values.pop_front();
            if let Some(ts) = self.timestamps.as_mut() {
                ts.pop_front();
            }
        }
        self.values.push_back(value);

        if let Some(ts) = self.timestamps.as_mut() {
            let dt = self
                .last_append
                .map_or(0.0, |prev| now.duration_since(prev).as_secs_f64());
            ts.push_back(dt);
        }
        self.last_append = Some(now);

        let threshold = self.full_threshold();
        if previous_len < threshold && self.values.len() >= threshold {
            self.notify_full();
        }
    }

    /// Remove every sample
    pub fn clear(&mut self) {
        self.values.clear();
        if let Some(ts) = self.timestamps.as_mut() {
            ts.clear();
        }
        self.last_append = None;
    }

    /// Restore the default capacity and remove every sample
    pub fn reset(&mut self) {
        self.capacity = self.default_capacity;
        self.clear();
    }

    /// Change the capacity, discarding the current samples
    pub fn set_new_len(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(ScopeError::InvalidCapacity(capacity));
        }
        self.capacity = capacity;
        self.values = VecDeque::with_capacity(capacity);
        if self.timestamps.is_some() {
            self.timestamps = Some(VecDeque::with_capacity(capacity));
        }
        self.last_append = None;
        Ok(())
    }

    /// Replace the contents with `values`
    ///
    /// Capacity shrinks to the number of values when that is smaller; when
    /// it is larger only the newest `capacity` values are kept. Does not
    /// emit `full`.
    pub fn fill(&mut self, values: &[f64]) {
        self.fill_with_intervals(values, None);
    }

    /// Replace the contents without shrinking the capacity
    pub(crate) fn refill(&mut self, values: &[f64]) {
        self.clear();
        let skip = values.len().saturating_sub(self.capacity);
        self.values.extend(values[skip..].iter().copied());
        if let Some(ts) = self.timestamps.as_mut() {
            ts.extend(std::iter::repeat(0.0).take(self.values.len()));
        }
    }

    fn fill_with_intervals(&mut self, values: &[f64], intervals: Option<&[f64]>) {
        if values.len() < self.capacity {
            self.capacity = values.len().max(1);
        }
        self.clear();

        let skip = values.len().saturating_sub(self.capacity);
        self.values.extend(values[skip..].iter().copied());

        if let Some(ts) = self.timestamps.as_mut() {
            match intervals {
                Some(intervals) if intervals.len() == values.len() => {
                    ts.extend(intervals[skip..].iter().copied());
                    if let Some(first) = ts.front_mut() {
                        *first = 0.0;
                    }
                }
                _ => ts.extend(std::iter::repeat(0.0).take(self.values.len())),
            }
        }
    }

    /// Write the samples as a single-column CSV file named after the buffer
    pub fn try_save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        persist::write_columns(path, [(self.name.as_str(), self.values.iter().copied())])
    }

    /// Best-effort [`try_save`](Self::try_save); failures are logged
    ///
    /// Returns whether the file was written.
    pub fn save(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_save(path) {
            Ok(()) => {
                tracing::debug!(buffer = %self.name, path = %path.display(), "Saved {} samples", self.len());
                true
            }
            Err(e) => {
                tracing::error!(buffer = %self.name, path = %path.display(), "Failed to save buffer: {}", e);
                false
            }
        }
    }

    /// Replace the contents from the column of a CSV file named after the buffer
    ///
    /// Timed buffers also pick up a `t` column of the same length when the
    /// file has one.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let columns = persist::read_columns(path)?;

        let column = columns
            .iter()
            .find(|c| c.name == self.name)
            .ok_or_else(|| {
                ScopeError::persistence(path, format!("no column named '{}'", self.name))
            })?;

        let intervals = columns
            .iter()
            .find(|c| c.name == TIME_COLUMN)
            .map(|t| persist::intervals_from_cumulative(&t.values));

        self.fill_with_intervals(&column.values, intervals.as_deref());
        tracing::debug!(buffer = %self.name, path = %path.display(), "Loaded {} samples", self.len());
        Ok(())
    }

    fn notify_full(&mut self) {
        tracing::trace!(buffer = %self.name, len = self.values.len(), "Buffer full");

        if self.events.is_enabled() && self.events.subscriber_count(BufferEventKind::Full) > 0 {
            let event = BufferEvent::Full {
                name: self.name.clone(),
                values: self.to_vec(),
                timestamps: self.timestamps.as_ref().map(|ts| ts.iter().copied().collect()),
            };
            self.events.emit(&event);
        }

        if self.auto_clear_on_full {
            self.clear();
        }
    }
}

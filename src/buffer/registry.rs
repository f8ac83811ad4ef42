//! Named collection of signal buffers sharing one capacity
//!
//! A [`MultiSignalRegistry`] owns one [`RingSignalBuffer`] per signal name
//! plus an optional shared time axis that advances once per
//! [`append_all`](MultiSignalRegistry::append_all) batch. All buffers and
//! the time axis always have the same capacity.

use crate::buffer::persist::{self, TIME_COLUMN};
use crate::buffer::ring::{self, BufferEvent, BufferEventKind, RingSignalBuffer};
use crate::error::{Result, ScopeError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared elapsed-time ring, in seconds since the first tick
#[derive(Debug)]
struct TimeAxis {
    values: VecDeque<f64>,
    capacity: usize,
    origin: Option<Instant>,
}

impl TimeAxis {
    fn new(capacity: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            origin: None,
        }
    }

    fn tick(&mut self) {
        let origin = *self.origin.get_or_insert_with(Instant::now);
        if self.values.len() >= self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(origin.elapsed().as_secs_f64());
    }

    fn clear(&mut self) {
        self.values.clear();
        self.origin = None;
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.values = VecDeque::with_capacity(capacity);
        self.origin = None;
    }

    /// Replace the contents and continue counting from the last loaded time
    fn fill(&mut self, values: &[f64]) {
        self.values.clear();
        let skip = values.len().saturating_sub(self.capacity);
        self.values.extend(values[skip..].iter().copied());
        self.origin = values.last().and_then(|last| {
            Duration::try_from_secs_f64(*last)
                .ok()
                .and_then(|elapsed| Instant::now().checked_sub(elapsed))
        });
    }
}

/// Outcome of a multi-signal append
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Names whose buffer received a value
    pub appended: Vec<String>,
    /// Names that do not belong to the registry
    pub unknown: Vec<String>,
    /// Whether the shared time axis advanced
    pub time_advanced: bool,
}

impl BatchReport {
    /// Whether every supplied name was known
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty()
    }
}

/// Registry of signal buffers keyed by name
#[derive(Debug)]
pub struct MultiSignalRegistry {
    /// Signal names in construction order
    order: Vec<String>,
    buffers: HashMap<String, RingSignalBuffer>,
    capacity: usize,
    default_capacity: usize,
    time_axis: Option<TimeAxis>,
}

impl MultiSignalRegistry {
    /// Create a registry with one buffer per name
    ///
    /// The first name becomes the primary key. With `timed` set, a shared
    /// time axis is kept alongside the buffers.
    pub fn new<I, S>(names: I, capacity: usize, timed: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order = Self::validate_names(names, capacity)?;
        let buffers = order
            .iter()
            .map(|name| RingSignalBuffer::new(name.clone(), capacity).map(|b| (name.clone(), b)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            order,
            buffers,
            capacity,
            default_capacity: capacity,
            time_axis: timed.then(|| TimeAxis::new(capacity)),
        })
    }

    fn validate_names<I, S>(names: I, capacity: usize) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let order: Vec<String> = names.into_iter().map(Into::into).collect();
        if order.is_empty() {
            return Err(ScopeError::Validation(
                "a registry needs at least one signal".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &order {
            ring::validate(name, capacity)?;
            if !seen.insert(name.as_str()) {
                return Err(ScopeError::DuplicateName(name.clone()));
            }
        }
        Ok(order)
    }

    /// Name of the first signal
    pub fn primary_key(&self) -> &str {
        &self.order[0]
    }

    /// Signal names in order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Shared capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of signals
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry has no signals
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether a shared time axis is kept
    pub fn is_timed(&self) -> bool {
        self.time_axis.is_some()
    }

    /// Whether a signal exists
    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Borrow one buffer
    pub fn get(&self, name: &str) -> Option<&RingSignalBuffer> {
        self.buffers.get(name)
    }

    /// Mutably borrow one buffer
    pub fn get_mut(&mut self, name: &str) -> Option<&mut RingSignalBuffer> {
        self.buffers.get_mut(name)
    }

    /// Shared time axis, when kept
    pub fn time_axis(&self) -> Option<&VecDeque<f64>> {
        self.time_axis.as_ref().map(|t| &t.values)
    }

    /// Append one value per named signal
    ///
    /// Unknown names are logged and skipped; the rest of the batch still
    /// goes through. The time axis advances once when at least one value
    /// was appended.
    pub fn append_all<I, K>(&mut self, values: I) -> BatchReport
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut report = BatchReport::default();

        for (name, value) in values {
            let name = name.as_ref();
            match self.buffers.get_mut(name) {
                Some(buffer) => {
                    buffer.append(value);
                    report.appended.push(name.to_string());
                }
                None => {
                    tracing::error!(signal = %name, "Unknown signal name, value dropped");
                    report.unknown.push(name.to_string());
                }
            }
        }

        if !report.appended.is_empty() {
            if let Some(axis) = self.time_axis.as_mut() {
                axis.tick();
                report.time_advanced = true;
            }
        }

        report
    }

    /// Append to a single buffer; unknown names are ignored
    ///
    /// Returns whether the value was stored. Does not advance the time axis.
    pub fn append_to(&mut self, name: &str, value: f64) -> bool {
        match self.buffers.get_mut(name) {
            Some(buffer) => {
                buffer.append(value);
                true
            }
            None => false,
        }
    }

    /// Borrowed view of every buffer, in order
    pub fn get_all(&self) -> Vec<(&str, &VecDeque<f64>)> {
        self.order
            .iter()
            .filter_map(|name| self.buffers.get(name).map(|b| (name.as_str(), b.data())))
            .collect()
    }

    /// [`get_all`](Self::get_all) preceded by the `t` column when timed
    pub fn get_all_with_time(&self) -> Vec<(&str, &VecDeque<f64>)> {
        let mut all = Vec::with_capacity(self.order.len() + 1);
        if let Some(axis) = self.time_axis.as_ref() {
            all.push((TIME_COLUMN, &axis.values));
        }
        all.extend(self.get_all());
        all
    }

    /// Register a handler on one buffer
    ///
    /// Returns false when the name is unknown. Subscriptions do not survive
    /// [`load`](Self::load), which rebuilds the buffers.
    pub fn on<F>(&self, name: &str, kind: BufferEventKind, handler: F) -> bool
    where
        F: Fn(&BufferEvent) + Send + Sync + 'static,
    {
        match self.buffers.get(name) {
            Some(buffer) => {
                buffer.on(kind, handler);
                true
            }
            None => false,
        }
    }

    /// Register the same handler on every buffer
    pub fn on_each<F>(&self, kind: BufferEventKind, handler: F)
    where
        F: Fn(&BufferEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        for buffer in self.buffers.values() {
            let handler = Arc::clone(&handler);
            buffer.on(kind, move |event| handler(event));
        }
    }

    /// Change the capacity of every buffer and the time axis
    ///
    /// Existing samples are discarded.
    pub fn set_new_len(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(ScopeError::InvalidCapacity(capacity));
        }
        for buffer in self.buffers.values_mut() {
            buffer.set_new_len(capacity)?;
        }
        if let Some(axis) = self.time_axis.as_mut() {
            axis.set_capacity(capacity);
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Remove every sample, keeping the capacity
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.clear();
        }
        if let Some(axis) = self.time_axis.as_mut() {
            axis.clear();
        }
    }

    /// Restore the construction capacity and remove every sample
    pub fn reset(&mut self) -> Result<()> {
        self.set_new_len(self.default_capacity)
    }

    /// Write all signals (and `t` first, when timed) to one CSV file
    pub fn try_save_all(&self, path: impl AsRef<Path>) -> Result<()> {
        let columns = self
            .get_all_with_time()
            .into_iter()
            .map(|(name, values)| (name, values.iter().copied()));
        persist::write_columns(path.as_ref(), columns)
    }

    /// Best-effort [`try_save_all`](Self::try_save_all); failures are logged
    pub fn save_all(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.try_save_all(path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), signals = self.len(), "Saved registry");
                true
            }
            Err(e) => {
                tracing::error!(path = %path.display(), "Failed to save registry: {}", e);
                false
            }
        }
    }

    /// Rebuild the registry from a CSV file
    ///
    /// Every non-`t` column becomes a buffer; the previous buffers and their
    /// subscriptions are dropped. A `t` column becomes the time axis. The
    /// capacity shrinks to the longest column when that is shorter.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let columns = persist::read_columns(path)?;

        let (time, signals): (Vec<_>, Vec<_>) =
            columns.into_iter().partition(|c| c.name == TIME_COLUMN);
        if signals.is_empty() {
            return Err(ScopeError::persistence(path, "no signal columns"));
        }

        let longest = signals.iter().map(|c| c.values.len()).max().unwrap_or(0);
        let capacity = if longest < self.capacity {
            longest.max(1)
        } else {
            self.capacity
        };

        let order = Self::validate_names(signals.iter().map(|c| c.name.clone()), capacity)?;
        let mut buffers = HashMap::with_capacity(signals.len());
        for column in &signals {
            let mut buffer = RingSignalBuffer::new(column.name.clone(), capacity)?;
            buffer.refill(&column.values);
            buffers.insert(column.name.clone(), buffer);
        }

        let time_axis = match time.into_iter().next() {
            Some(column) => {
                let mut axis = TimeAxis::new(capacity);
                axis.fill(&column.values);
                Some(axis)
            }
            None => self.time_axis.is_some().then(|| TimeAxis::new(capacity)),
        };

        self.order = order;
        self.buffers = buffers;
        self.capacity = capacity;
        self.time_axis = time_axis;

        tracing::debug!(path = %path.display(), signals = self.len(), capacity, "Loaded registry");
        Ok(())
    }
}

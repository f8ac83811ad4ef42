//! Interval timers for throttling consumers
//!
//! - [`SamplerTimeCounter`] measures the wall-clock time between consecutive
//!   updates and reports it as a frequency
//! - [`TimerCount`] gates a callback so it runs at most once per interval

use std::fmt;
use std::time::{Duration, Instant};

/// Measures the interval between consecutive updates
#[derive(Debug, Clone)]
pub struct SamplerTimeCounter {
    last: Instant,
    interval: Duration,
}

impl Default for SamplerTimeCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplerTimeCounter {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            interval: Duration::ZERO,
        }
    }

    /// Record a sample; returns the time since the previous one
    pub fn update(&mut self) -> Duration {
        let now = Instant::now();
        self.interval = now.duration_since(self.last);
        self.last = now;
        self.interval
    }

    /// Interval measured by the last update
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Updates per second implied by the last interval, or 0 if it was zero
    pub fn frequency(&self) -> f64 {
        frequency_of(self.interval)
    }

    /// Start measuring from now
    pub fn reset(&mut self) {
        self.last = Instant::now();
        self.interval = Duration::ZERO;
    }
}

fn frequency_of(interval: Duration) -> f64 {
    let secs = interval.as_secs_f64();
    if secs == 0.0 {
        0.0
    } else {
        1.0 / secs
    }
}

type Callback = Box<dyn FnMut() + Send>;

/// Fires a callback at most once every `interval`
///
/// Nothing runs on its own; the owner calls [`update`](Self::update) from
/// its loop and the timer decides whether enough time has passed.
pub struct TimerCount {
    interval: Duration,
    last_fire: Instant,
    ready: bool,
    callback: Option<Callback>,
}

impl fmt::Debug for TimerCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerCount")
            .field("interval", &self.interval)
            .field("ready", &self.ready)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

impl TimerCount {
    /// Create a timer without a callback; use [`is_ready`](Self::is_ready)
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fire: Instant::now(),
            ready: false,
            callback: None,
        }
    }

    /// Create a timer that runs `callback` each time it fires
    pub fn with_callback<F>(interval: Duration, callback: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        Self {
            callback: Some(Box::new(callback)),
            ..Self::new(interval)
        }
    }

    /// Fire if at least `interval` has passed since the last fire
    ///
    /// Returns whether this call fired.
    pub fn update(&mut self) -> bool {
        let now = Instant::now();
        self.ready = now.duration_since(self.last_fire) >= self.interval;
        if self.ready {
            self.last_fire = now;
            if let Some(callback) = self.callback.as_mut() {
                callback();
            }
        }
        self.ready
    }

    /// Whether the most recent update fired
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Restart the interval from now and clear the ready flag
    pub fn reset(&mut self) {
        self.last_fire = Instant::now();
        self.ready = false;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread::sleep;

    #[test]
    fn test_zero_interval_has_zero_frequency() {
        let counter = SamplerTimeCounter::new();
        assert_eq!(counter.interval(), Duration::ZERO);
        assert_eq!(counter.frequency(), 0.0);
        assert_eq!(frequency_of(Duration::from_millis(250)), 4.0);
    }

    #[test]
    #[serial]
    fn test_sampler_measures_interval() {
        let mut counter = SamplerTimeCounter::new();
        sleep(Duration::from_millis(20));
        let interval = counter.update();

        assert!(interval >= Duration::from_millis(20));
        assert!(counter.frequency() > 0.0 && counter.frequency() <= 50.0);

        counter.reset();
        assert_eq!(counter.frequency(), 0.0);
    }

    #[test]
    #[serial]
    fn test_timer_fires_once_per_interval() {
        let fired = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&fired);
        let mut timer = TimerCount::with_callback(Duration::from_millis(30), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!timer.update());
        assert!(!timer.is_ready());

        sleep(Duration::from_millis(40));
        assert!(timer.update());
        assert!(timer.is_ready());
        assert!(!timer.update());
        assert!(!timer.is_ready());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[serial]
    fn test_reset_restarts_interval() {
        let mut timer = TimerCount::new(Duration::from_millis(30));
        sleep(Duration::from_millis(40));
        timer.reset();
        assert!(!timer.update());

        timer.set_interval(Duration::ZERO);
        assert!(timer.update());
        assert_eq!(timer.interval(), Duration::ZERO);
    }
}

//! Helpers for observing events from background threads

use crossbeam_channel::Receiver;
use std::time::{Duration, Instant};

/// Receive until `predicate` matches or `timeout` passes
///
/// Returns the matching item, if any.
pub fn wait_for<T>(rx: &Receiver<T>, timeout: Duration, predicate: impl Fn(&T) -> bool) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok(item) if predicate(&item) => return Some(item),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Everything received within `window`
pub fn collect_for<T>(rx: &Receiver<T>, window: Duration) -> Vec<T> {
    let deadline = Instant::now() + window;
    let mut items = Vec::new();
    while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(remaining) {
            Ok(item) => items.push(item),
            Err(_) => break,
        }
    }
    items
}

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

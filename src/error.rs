//! Error handling for serialscope
//!
//! This module defines the crate error type and a Result alias. Errors fall
//! into two groups:
//!
//! - **Transient** transport faults (open, close, read, write, enumeration).
//!   Serial links catch these where they happen, log them and retry; they
//!   never reach the caller of a link operation.
//! - **Validation** faults (reserved or duplicate buffer names, malformed
//!   persisted files, bad configuration). These are returned to the caller
//!   immediately because they indicate a setup mistake.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for serialscope operations
#[derive(Error, Debug)]
pub enum ScopeError {
    /// A buffer was given the name reserved for the time axis
    #[error("Buffer name '{0}' is reserved for the time axis")]
    ReservedName(String),

    /// A buffer or registry was given an unusable capacity
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(usize),

    /// The same signal name was supplied twice
    #[error("Duplicate signal name: {0}")]
    DuplicateName(String),

    /// Generic validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// A persisted buffer file could not be read or written
    #[error("Persistence error in {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    /// CSV encoding/decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Transport faults reported by a transport implementation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors from the serial port driver
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The transport is not open
    #[error("Transport is not open")]
    NotOpen,

    /// Errors related to configuration loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// A link worker is already running
    #[error("Link '{0}' is already running")]
    AlreadyRunning(String),

    /// The worker thread could not be spawned
    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ScopeError>,
    },
}

impl ScopeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ScopeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a persistence error for a path
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        ScopeError::Persistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error is an environmental fault that may clear up on retry
    pub fn is_transient(&self) -> bool {
        match self {
            ScopeError::Transport(_)
            | ScopeError::Serial(_)
            | ScopeError::NotOpen
            | ScopeError::Io(_) => true,
            ScopeError::WithContext { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type alias for serialscope operations
pub type Result<T> = std::result::Result<T, ScopeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScopeError::ReservedName("t".to_string());
        assert_eq!(
            err.to_string(),
            "Buffer name 't' is reserved for the time axis"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = ScopeError::Validation("missing column".to_string());
        let with_ctx = err.with_context("Failed to load buffer");
        assert!(with_ctx.to_string().contains("Failed to load buffer"));
    }

    #[test]
    fn test_persistence_error_names_path() {
        let err = ScopeError::persistence("/tmp/signal.csv", "no such column");
        assert!(err.to_string().contains("/tmp/signal.csv"));
        assert!(err.to_string().contains("no such column"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ScopeError::Transport("unplugged".into()).is_transient());
        assert!(ScopeError::NotOpen.with_context("read").is_transient());
        assert!(!ScopeError::ReservedName("t".into()).is_transient());
        assert!(!ScopeError::InvalidCapacity(0).is_transient());
    }
}

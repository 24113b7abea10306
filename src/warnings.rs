//! Warnings
//!
//! Recoverable conditions the engine works around (degraded storage, stale
//! fallback, failed cleanup) are reported to an injected sink rather than a
//! process-wide logger.

use std::fmt;

use parking_lot::Mutex;
use tracing::warn;

/// A recoverable condition observed by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// Storage lookup failed with something other than not-found/expired;
    /// the call continued as a cache miss
    LookupFailed {
        key: String,
        params: String,
        error: String,
    },
    /// The resolver failed and an expired entry was served instead
    StaleFallback {
        key: String,
        params: String,
        error: String,
    },
    /// Cleanup of one key failed; other keys were still processed
    CleanupFailed { key: String, error: String },
}

impl Warning {
    pub fn key(&self) -> &str {
        match self {
            Warning::LookupFailed { key, .. }
            | Warning::StaleFallback { key, .. }
            | Warning::CleanupFailed { key, .. } => key,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::LookupFailed { key, params, error } => write!(
                f,
                "ignoring error while getting cached result for key={key:?} params={params}: {error}"
            ),
            Warning::StaleFallback { key, params, error } => write!(
                f,
                "falling back to expired cache result after fresh retrieval failed for key={key:?} params={params}: {error}"
            ),
            Warning::CleanupFailed { key, error } => {
                write!(f, "cleanup failed for key={key:?}: {error}")
            }
        }
    }
}

/// Receives warnings emitted by the engine.
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: Warning);
}

/// Forwards warnings to `tracing` at WARN level. This is the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl WarningSink for TracingSink {
    fn warn(&self, warning: Warning) {
        warn!(key = warning.key(), "{}", warning);
    }
}

/// Drops every warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl WarningSink for SilentSink {
    fn warn(&self, _warning: Warning) {}
}

/// Keeps warnings in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    warnings: Mutex<Vec<Warning>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.lock().clone()
    }

    /// Returns the recorded warnings and forgets them.
    pub fn take(&self) -> Vec<Warning> {
        std::mem::take(&mut *self.warnings.lock())
    }
}

impl WarningSink for RecordingSink {
    fn warn(&self, warning: Warning) {
        self.warnings.lock().push(warning);
    }
}

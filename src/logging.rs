//! Logging collaborator.
//!
//! The engine never writes to the console directly; every component holds an
//! `Rc<dyn Logger>`. In the browser `ConsoleLogger` goes to `console.*`, on
//! native targets it emits `tracing` events.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// Severity of a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Sink for engine diagnostics
pub trait Logger {
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Run `f`, turning a panic into an error log line and `fallback`.
///
/// Native targets only: wasm32-unknown-unknown aborts on panic, so there a
/// panic in `f` is not caught.
pub fn protect<L, T, F>(logger: &L, label: &str, fallback: T, f: F) -> T
where
    L: Logger + ?Sized,
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            logger.error(&format!("[{}] failed: {}", label, reason));
            fallback
        }
    }
}

// =============================================================================
// ConsoleLogger
// =============================================================================

/// Browser console on wasm32, `tracing` everywhere else
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    #[cfg(target_arch = "wasm32")]
    fn log(&self, level: Level, message: &str) {
        let value = wasm_bindgen::JsValue::from_str(message);
        match level {
            Level::Debug => web_sys::console::debug_1(&value),
            Level::Info => web_sys::console::info_1(&value),
            Level::Warn => web_sys::console::warn_1(&value),
            Level::Error => web_sys::console::error_1(&value),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "phrasecore", "{}", message),
            Level::Info => tracing::info!(target: "phrasecore", "{}", message),
            Level::Warn => tracing::warn!(target: "phrasecore", "{}", message),
            Level::Error => tracing::error!(target: "phrasecore", "{}", message),
        }
    }
}

// =============================================================================
// NullLogger / MemoryLogger
// =============================================================================

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// Keeps every line in memory (tests, diagnostics panels)
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: RefCell<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries.borrow().clone()
    }

    /// Number of lines at exactly `level`
    pub fn count(&self, level: Level) -> usize {
        self.entries.borrow().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries.borrow().iter().any(|(_, m)| m.contains(needle))
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.entries.borrow_mut().push((level, message.to_string()));
    }
}

// =============================================================================
// Tests
// =============================================================================

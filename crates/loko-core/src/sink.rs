//! Progress reporting for long-running steps
//!
//! Image builds, pushes and remote commands produce a steady trickle of output
//! lines. Components report them as [`LogEvent`]s through a [`LogSink`] so the
//! caller decides how (and whether) to present them.

use std::fmt;
use std::sync::Mutex;

/// Severity of a [`LogEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Verbose output such as raw build lines
    Debug,
    /// Step boundaries and results
    Info,
    /// Something unexpected that did not stop the run
    Warn,
    /// A failure
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// One progress message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Where the message came from, e.g. `acme/shop:builder` or `ssh`
    pub source: String,
    /// Severity
    pub level: LogLevel,
    /// The message text
    pub message: String,
}

impl LogEvent {
    /// Create an event
    pub fn new(source: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            level,
            message: message.into(),
        }
    }

    /// Shorthand for an info event
    pub fn info(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, LogLevel::Info, message)
    }

    /// Shorthand for a debug event
    pub fn debug(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, LogLevel::Debug, message)
    }

    /// Shorthand for a warning
    pub fn warn(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, LogLevel::Warn, message)
    }

    /// Shorthand for an error event
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source, LogLevel::Error, message)
    }
}

/// Receiver of progress events
pub trait LogSink: Send + Sync {
    /// Accept one event
    fn emit(&self, event: LogEvent);
}

impl<T: LogSink + ?Sized> LogSink for std::sync::Arc<T> {
    fn emit(&self, event: LogEvent) {
        (**self).emit(event)
    }
}

impl<T: LogSink + ?Sized> LogSink for &T {
    fn emit(&self, event: LogEvent) {
        (**self).emit(event)
    }
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        let LogEvent {
            source,
            level,
            message,
        } = event;
        match level {
            LogLevel::Debug => tracing::debug!(source = %source, "{}", message),
            LogLevel::Info => tracing::info!(source = %source, "{}", message),
            LogLevel::Warn => tracing::warn!(source = %source, "{}", message),
            LogLevel::Error => tracing::error!(source = %source, "{}", message),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far
    pub fn events(&self) -> Vec<LogEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages received so far, in order
    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.message).collect()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, event: LogEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LogSink for NullSink {
    fn emit(&self, _event: LogEvent) {}
}

//! # Structured Logger
//!
//! Shared, append-only logger handed to every component at construction.
//!
//! Each retained entry is kept in a capped ring buffer (oldest entries are
//! evicted first) and forwarded to `tracing`, so the binary's subscriber
//! still sees everything. Tests build their own `Logger` and inspect
//! [`Logger::entries`] without touching process-wide state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Default ring buffer capacity
pub const DEFAULT_LOG_CAPACITY: usize = 1_000;

/// Log level for structured logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// A structured log entry.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    /// Component that emitted the entry (e.g. "shipping", "checkout")
    pub component: String,
    pub message: String,
    /// Additional structured fields (always a JSON object or null)
    #[serde(skip_serializing_if = "Value::is_null")]
    pub fields: Value,
}

impl LogEntry {
    /// Look up a structured field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

struct LogBuffer {
    min_level: LogLevel,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

/// Cloneable logger handle. Clones share one ring buffer.
#[derive(Clone)]
pub struct Logger {
    buffer: Arc<LogBuffer>,
    component: Arc<str>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("component", &self.component)
            .field("min_level", &self.buffer.min_level)
            .field("capacity", &self.buffer.capacity)
            .finish()
    }
}

static GLOBAL_LOGGER: OnceLock<Logger> = OnceLock::new();

impl Logger {
    /// Create a logger with its own buffer.
    pub fn new(min_level: LogLevel, capacity: usize) -> Self {
        Self {
            buffer: Arc::new(LogBuffer {
                min_level,
                capacity: capacity.max(1),
                entries: Mutex::new(VecDeque::with_capacity(capacity.clamp(1, 1024))),
            }),
            component: Arc::from("app"),
        }
    }

    /// Process-wide default logger, created on first use.
    ///
    /// Binaries call [`Logger::init_global`] early to choose level and
    /// capacity; otherwise INFO with [`DEFAULT_LOG_CAPACITY`] is used.
    pub fn global() -> Logger {
        GLOBAL_LOGGER
            .get_or_init(|| Logger::new(LogLevel::Info, DEFAULT_LOG_CAPACITY))
            .clone()
    }

    /// Initialise the process-wide logger. Returns the effective logger,
    /// which is the existing one if it was already initialised.
    pub fn init_global(min_level: LogLevel, capacity: usize) -> Logger {
        GLOBAL_LOGGER
            .get_or_init(|| Logger::new(min_level, capacity))
            .clone()
    }

    /// Handle sharing this buffer but tagging entries with `component`.
    pub fn for_component(&self, component: &str) -> Logger {
        Self {
            buffer: Arc::clone(&self.buffer),
            component: Arc::from(component),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn min_level(&self) -> LogLevel {
        self.buffer.min_level
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into(), Value::Null);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into(), Value::Null);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message.into(), Value::Null);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into(), Value::Null);
    }

    pub fn debug_with(&self, message: impl Into<String>, fields: Value) {
        self.log(LogLevel::Debug, message.into(), fields);
    }

    pub fn info_with(&self, message: impl Into<String>, fields: Value) {
        self.log(LogLevel::Info, message.into(), fields);
    }

    pub fn warn_with(&self, message: impl Into<String>, fields: Value) {
        self.log(LogLevel::Warn, message.into(), fields);
    }

    pub fn error_with(&self, message: impl Into<String>, fields: Value) {
        self.log(LogLevel::Error, message.into(), fields);
    }

    fn log(&self, level: LogLevel, message: String, fields: Value) {
        if level < self.buffer.min_level {
            return;
        }

        let component = &*self.component;
        match level {
            LogLevel::Debug => tracing::debug!(component, fields = %fields, "{}", message),
            LogLevel::Info => tracing::info!(component, fields = %fields, "{}", message),
            LogLevel::Warn => tracing::warn!(component, fields = %fields, "{}", message),
            LogLevel::Error => tracing::error!(component, fields = %fields, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            component: component.to_string(),
            message,
            fields,
        };

        let mut entries = self.buffer.entries.lock();
        if entries.len() >= self.buffer.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of retained entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.buffer.entries.lock().iter().cloned().collect()
    }

    /// Retained entries at exactly `level`
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.buffer
            .entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    /// The most recent `limit` entries, newest last
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.buffer.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.buffer.entries.lock().clear();
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(LogLevel::Info, DEFAULT_LOG_CAPACITY)
    }
}

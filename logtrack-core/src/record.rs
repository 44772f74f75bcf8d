//! Host-neutral view of one log record.
//!
//! Host integrations (the `tracing` layer, the replay CLI) translate their
//! native events into a [`LogRecord`]; the engine never sees host types.

use logtrack_activity::{ErrorInfo, OpCompCode, OpLevel, Timestamp};
use std::sync::atomic::{AtomicU64, Ordering};

/// Native level of a log record
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::EnumString, strum::Display,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RecordLevel {
    Off,
    Error,
    #[strum(to_string = "WARN", serialize = "WARNING")]
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    All,
}

impl RecordLevel {
    /// Telemetry severity of records at this level.
    pub fn severity(self) -> OpLevel {
        match self {
            RecordLevel::Info => OpLevel::Info,
            RecordLevel::Error => OpLevel::Error,
            RecordLevel::Warn => OpLevel::Warning,
            RecordLevel::Debug => OpLevel::Debug,
            RecordLevel::Trace => OpLevel::Trace,
            RecordLevel::Off => OpLevel::None,
            RecordLevel::All => OpLevel::Info,
        }
    }

    /// Completion code of records at this level. Only failure-indicating
    /// levels produce a non-success code.
    pub fn completion_code(self) -> OpCompCode {
        match self {
            RecordLevel::Error => OpCompCode::Error,
            RecordLevel::Warn => OpCompCode::Warning,
            _ => OpCompCode::Success,
        }
    }
}

impl From<tracing::Level> for RecordLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => RecordLevel::Error,
            tracing::Level::WARN => RecordLevel::Warn,
            tracing::Level::INFO => RecordLevel::Info,
            tracing::Level::DEBUG => RecordLevel::Debug,
            _ => RecordLevel::Trace,
        }
    }
}

/// Identifies the logical execution context that owns the current activity
/// and the elapsed-time reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey(u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_CONTEXT: ContextKey = ContextKey(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed));
}

impl ContextKey {
    /// Key of the calling thread.
    pub fn current() -> Self {
        THREAD_CONTEXT.with(|key| *key)
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Where a record was emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSite {
    pub class: Option<String>,
    pub method: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl CallSite {
    /// `file:line`, or just the file when the line is unknown.
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{file}:{line}")),
            (Some(file), None) => Some(file.clone()),
            (None, _) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub message: String,
    pub level: RecordLevel,
    pub thread_name: String,
    pub timestamp: Timestamp,
    pub call_site: Option<CallSite>,
    pub error: Option<ErrorInfo>,
    /// Logger or category identity, used as the default event source name.
    pub logger: Option<String>,
    /// Ambient key/value pairs, merged beneath message annotations.
    pub context: Vec<(String, String)>,
    pub context_key: ContextKey,
}

impl LogRecord {
    /// A record emitted now, on the calling thread.
    pub fn new(level: RecordLevel, message: impl Into<String>) -> Self {
        let thread = std::thread::current();
        let thread_name = thread
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:?}", thread.id()));
        Self {
            message: message.into(),
            level,
            thread_name,
            timestamp: Timestamp::from_millis(Timestamp::now().as_millis()),
            call_site: None,
            error: None,
            logger: None,
            context: Vec::new(),
            context_key: ContextKey::current(),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the record time from host milliseconds.
    pub fn with_timestamp_millis(mut self, millis: i64) -> Self {
        self.timestamp = Timestamp::from_millis(millis);
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }

    pub fn in_context(mut self, key: ContextKey) -> Self {
        self.context_key = key;
        self
    }
}

//! Telemetry event types: levels, completion codes, sources and the finished event record.

use num_enum::TryFromPrimitive;
use serde::{Deserialize, Serialize};

use crate::Timestamp;
use crate::activity::Activity;
use crate::snapshot::Snapshot;

/// Severity of an event or activity
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    TryFromPrimitive,
    strum::EnumString,
    strum::Display,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OpLevel {
    None = 0,
    Trace = 1,
    Debug = 2,
    #[default]
    Info = 3,
    Notice = 4,
    Warning = 5,
    Error = 6,
    Critical = 7,
    Failure = 8,
    Fatal = 9,
    Halt = 10,
}

/// Outcome of a single operation
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    TryFromPrimitive,
    strum::EnumString,
    strum::Display,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OpCompCode {
    #[default]
    Success = 0,
    Warning = 1,
    Error = 2,
}

/// Kind of operation an event describes
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    TryFromPrimitive,
    strum::EnumString,
    strum::Display,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
#[repr(u8)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum OpType {
    Other = 0,
    Start = 1,
    Stop = 2,
    Open = 3,
    Close = 4,
    Send = 5,
    Receive = 6,
    Inquire = 7,
    Set = 8,
    Browse = 9,
    Add = 10,
    Update = 11,
    Remove = 12,
    Clear = 13,
    Datagram = 14,
    Call = 15,
    Activity = 16,
    #[default]
    Event = 17,
    Snapshot = 18,
    Request = 19,
    Response = 20,
}

/// Lifecycle status of an activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityStatus {
    #[default]
    Running,
    End,
    Exception,
}

impl ActivityStatus {
    /// Status an activity ends with, depending on whether an error was attached.
    pub fn closing(has_error: bool) -> Self {
        if has_error {
            ActivityStatus::Exception
        } else {
            ActivityStatus::End
        }
    }
}

/// Kind of entity that produced telemetry
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::EnumString,
    strum::Display,
    serde_with::DeserializeFromStr,
    serde_with::SerializeDisplay,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SourceType {
    #[default]
    Appl,
    Process,
    Thread,
    Logger,
    Host,
    Server,
    Service,
    Runtime,
    User,
}

/// Logical origin of an event or activity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

impl Source {
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
        }
    }
}

/// Error attached to a record, normalized to its message and cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            causes: Vec::new(),
        }
    }

    /// Capture an error together with its `source()` chain.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: err.to_string(),
            causes,
        }
    }

    pub fn with_causes(mut self, causes: Vec<String>) -> Self {
        self.causes = causes;
        self
    }
}

/// A finished telemetry record describing one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: u64,
    /// Operation name
    pub operation: String,
    pub op_type: OpType,
    pub severity: OpLevel,
    pub comp_code: OpCompCode,
    pub reason_code: i32,
    pub source: Source,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub message_age_usec: i64,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Snapshot>,
}

impl TrackingEvent {
    pub fn elapsed_usec(&self) -> i64 {
        self.end.usec_since(self.start)
    }
}

/// Anything handed to a sink: a standalone event (datagram) or a finished activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Trackable {
    Event(TrackingEvent),
    Activity(Activity),
}

impl Trackable {
    pub fn as_event(&self) -> Option<&TrackingEvent> {
        match self {
            Trackable::Event(event) => Some(event),
            Trackable::Activity(_) => None,
        }
    }

    pub fn as_activity(&self) -> Option<&Activity> {
        match self {
            Trackable::Activity(activity) => Some(activity),
            Trackable::Event(_) => None,
        }
    }
}

/// Parse a code-like enum from its member name (any case) or its numeric value.
pub fn parse_code<T>(value: &str) -> Option<T>
where
    T: std::str::FromStr + TryFrom<u8>,
{
    let value = value.trim();
    match value.parse::<u8>() {
        Ok(n) => T::try_from(n).ok(),
        Err(_) => value.parse::<T>().ok(),
    }
}

//! Activity: a named, time-bounded group of related events.

use serde::{Deserialize, Serialize};

use crate::events::{ActivityStatus, ErrorInfo, OpLevel, Source, TrackingEvent};
use crate::snapshot::Snapshot;
use crate::{Timestamp, next_id};

/// A causally related run of events.
///
/// An activity is `RUNNING` from creation until [`stop`](Self::stop) sets its
/// closing status and end time. Attached events are kept in arrival order and
/// the child count never decreases while the activity is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: u64,
    pub name: String,
    pub severity: OpLevel,
    pub status: ActivityStatus,
    pub source: Source,
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
    pub start: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<TrackingEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snapshots: Vec<Snapshot>,
}

impl Activity {
    pub fn new(name: impl Into<String>, severity: OpLevel, source: Source, start: Timestamp) -> Self {
        Self {
            id: next_id(),
            name: name.into(),
            severity,
            status: ActivityStatus::Running,
            source,
            resource: None,
            user: None,
            tag: None,
            correlator: None,
            location: None,
            start,
            end: None,
            exception: None,
            events: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Number of events attached so far.
    pub fn child_count(&self) -> usize {
        self.events.len()
    }

    /// Attach a finished event, returning the new child count.
    pub fn attach(&mut self, event: TrackingEvent) -> usize {
        self.events.push(event);
        self.events.len()
    }

    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshots.push(snapshot);
    }

    /// Close the activity. An end before the start is clamped to the start.
    pub fn stop(&mut self, status: ActivityStatus, end: Timestamp) {
        self.status = status;
        self.end = Some(end.max(self.start));
    }

    pub fn elapsed_usec(&self) -> Option<i64> {
        self.end.map(|end| end.usec_since(self.start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SourceType;

    fn activity() -> Activity {
        Activity::new(
            "Checkout",
            OpLevel::Info,
            Source::new("shop", SourceType::Appl),
            Timestamp::from_usec(5_000),
        )
    }

    #[test]
    fn test_new_activity_is_running() {
        let activity = activity();
        assert_eq!(activity.status, ActivityStatus::Running);
        assert!(activity.is_open());
        assert_eq!(activity.child_count(), 0);
        assert_eq!(activity.elapsed_usec(), None);
    }

    #[test]
    fn test_stop_clamps_end_to_start() {
        let mut activity = activity();
        activity.stop(ActivityStatus::End, Timestamp::from_usec(1_000));
        assert!(!activity.is_open());
        assert_eq!(activity.end, Some(Timestamp::from_usec(5_000)));
        assert_eq!(activity.elapsed_usec(), Some(0));
    }

    #[test]
    fn test_closing_status() {
        assert_eq!(ActivityStatus::closing(true), ActivityStatus::Exception);
        assert_eq!(ActivityStatus::closing(false), ActivityStatus::End);
    }

    #[test]
    fn test_activity_json_omits_empty_fields() {
        let json = serde_json::to_string(&activity()).unwrap();
        assert!(json.contains(r#""name":"Checkout""#));
        assert!(json.contains(r#""status":"RUNNING""#));
        assert!(!json.contains("events"));
        assert!(!json.contains(r#""end""#));
    }
}

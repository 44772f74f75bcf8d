//! Telemetry model for logtrack.
//!
//! This crate holds the data that the tracking engine produces:
//! - [`TrackingEvent`]: one finished unit of work
//! - [`Activity`]: a named, time-bounded group of events
//! - [`Snapshot`]: a category of typed properties attached to either
//!
//! Finished items are handed to an [`EventSink`] as a [`Trackable`].

use std::sync::atomic::{AtomicU64, Ordering};

mod activity;
mod events;
mod sink;
mod snapshot;
mod timestamp;
mod usage;

pub use activity::Activity;
pub use events::{
    ActivityStatus, ErrorInfo, OpCompCode, OpLevel, OpType, Source, SourceType, Trackable,
    TrackingEvent, parse_code,
};
pub use sink::{ChannelSink, EventSink, JsonLinesSink, SinkError};
pub use snapshot::{DataType, Property, PropertyError, PropertyValue, Snapshot};
pub use timestamp::Timestamp;
pub use usage::{NoUsage, ProcessUsage, USAGE_CATEGORY, UsageSampler};

static ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new process-unique id for events, activities and snapshots.
pub fn next_id() -> u64 {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

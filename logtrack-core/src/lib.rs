//! Annotation parsing and activity correlation for log records.
//!
//! A [`Tracker`] takes a [`LogRecord`] through this pipeline:
//!
//! 1. [`AttributeMap::parse_with_context`] decodes `#key=value` annotations on
//!    top of the record's ambient context.
//! 2. [`is_activity_instruction`] routes `#beg`/`#end` records to the
//!    [`ActivityController`]; everything else becomes an event.
//! 3. [`build_event`] fills a [`TrackingEvent`](logtrack_activity::TrackingEvent)
//!    from the record and its attributes, timed by the [`TimingTracker`].
//! 4. The [`DispatchPolicy`] sends it standalone, attaches it to the open
//!    activity, or wraps it in an activity carrying a usage snapshot.
//!
//! ```rust,ignore
//! let (sink, rx) = logtrack_activity::ChannelSink::new();
//! let tracker = Tracker::new(TrackerConfig::default(), Arc::new(sink));
//! tracker.start()?;
//! tracker.append(&LogRecord::new(RecordLevel::Info, "#beg=Checkout"))?;
//! ```

mod annotation;
mod builder;
mod classify;
mod config;
mod controller;
mod dispatch;
mod error;
mod record;
mod timing;
mod tracker;

pub use annotation::{
    AttrKey, Attribute, AttributeMap, ParsedAnnotation, ReservedKey, tokenize,
};
pub use builder::{EventDefaults, build_event};
pub use classify::{Instruction, classify, is_activity_instruction};
pub use config::{DEFAULT_SIGIL, DEFAULT_SOURCE_NAME, TrackerConfig};
pub use controller::{ActivityController, ControlOutcome};
pub use dispatch::{Dispatch, DispatchPolicy};
pub use error::{ConfigError, TrackError, TrackResult};
pub use record::{CallSite, ContextKey, LogRecord, RecordLevel};
pub use timing::TimingTracker;
pub use tracker::{Outcome, Tracker};

use dashmap::DashMap;
use logtrack_activity::{
    Activity, ActivityStatus, EventSink, ProcessUsage, Source, Timestamp, UsageSampler,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

use crate::annotation::AttributeMap;
use crate::builder::{EventDefaults, build_event};
use crate::classify::is_activity_instruction;
use crate::config::TrackerConfig;
use crate::controller::{ActivityController, ControlOutcome};
use crate::dispatch::{Dispatch, DispatchPolicy};
use crate::error::TrackError;
use crate::record::{ContextKey, LogRecord};
use crate::timing::TimingTracker;

/// Result of [`Tracker::append`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tracker is not started; the record was ignored.
    Disabled,
    /// The record was an activity instruction.
    Control(Vec<ControlOutcome>),
    /// The record became an event.
    Dispatched(Dispatch),
}

/// State owned by one execution context.
#[derive(Debug, Default)]
struct ContextState {
    activity: Option<Activity>,
}

/// Turns log records into events and activities and hands them to a sink.
///
/// Records are processed synchronously on the caller's thread. Each context
/// (see [`ContextKey`]) owns at most one open activity.
pub struct Tracker {
    config: TrackerConfig,
    source: Source,
    sink: Arc<dyn EventSink>,
    usage: Arc<dyn UsageSampler>,
    timing: TimingTracker,
    dispatch: DispatchPolicy,
    contexts: DashMap<ContextKey, ContextState>,
    started: AtomicBool,
}

impl Tracker {
    pub fn new(config: TrackerConfig, sink: Arc<dyn EventSink>) -> Self {
        Self {
            source: config.source(),
            dispatch: DispatchPolicy::from_config(&config),
            config,
            sink,
            usage: Arc::new(ProcessUsage::new()),
            timing: TimingTracker::new(),
            contexts: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_usage_sampler(mut self, usage: Arc<dyn UsageSampler>) -> Self {
        self.usage = usage;
        self
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Open the sink. Until this succeeds every record is ignored.
    pub fn start(&self) -> Result<(), TrackError> {
        if self.is_started() {
            return Ok(());
        }
        if let Err(e) = self.sink.open() {
            error!(target: "logtrack::status", source = %self.source.name, "failed to open sink: {e}");
            return Err(e.into());
        }
        self.started.store(true, Ordering::Release);
        debug!(target: "logtrack::status", source = %self.source.name, "tracker started");
        Ok(())
    }

    /// Close every open activity, then close the sink.
    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::AcqRel) {
            return;
        }
        let controller = self.controller();
        let now = Timestamp::now();
        for mut state in self.contexts.iter_mut() {
            if let Some(activity) = state.activity.take() {
                let name = activity.name.clone();
                if let Err(e) = controller.flush(activity, ActivityStatus::End, now) {
                    warn!(target: "logtrack::status", name = %name, "failed to flush activity on stop: {e}");
                }
            }
        }
        self.contexts.clear();
        self.timing.clear();
        self.sink.close();
        debug!(target: "logtrack::status", source = %self.source.name, "tracker stopped");
    }

    /// Process one record.
    ///
    /// A sink error while closing an activity is returned as-is; the activity
    /// is gone by then and the context has nothing open.
    pub fn append(&self, record: &LogRecord) -> Result<Outcome, TrackError> {
        if !self.is_started() {
            return Ok(Outcome::Disabled);
        }

        let attrs = AttributeMap::parse_with_context(
            &record.message,
            self.config.sigil,
            record.context.iter().map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let key = record.context_key;
        let outcome = {
            let mut state = self.contexts.entry(key).or_default();
            self.process(record, &attrs, &mut state.activity)
        };
        // a context only keeps an entry while it has an open activity
        self.contexts.remove_if(&key, |_, state| state.activity.is_none());
        outcome
    }

    fn process(
        &self,
        record: &LogRecord,
        attrs: &AttributeMap,
        slot: &mut Option<Activity>,
    ) -> Result<Outcome, TrackError> {
        let controller = self.controller();
        if is_activity_instruction(attrs) {
            let outcomes = controller.process_activity_attrs(
                slot,
                attrs,
                record.level,
                record.error.as_ref(),
                record.timestamp,
            )?;
            return Ok(Outcome::Control(outcomes));
        }

        let elapsed = self.timing.elapsed_since_last(record.context_key);
        let defaults = EventDefaults {
            source_name: &self.source.name,
            source_type: self.source.source_type,
            snapshot_category: &self.config.snapshot_category,
        };
        let event = build_event(attrs, record, elapsed, &defaults)?;
        let resource = record.call_site.as_ref().and_then(|site| site.class.as_deref());
        let dispatch = self.dispatch.dispatch(
            event,
            slot,
            record.error.as_ref(),
            record.timestamp,
            &record.thread_name,
            resource,
            &controller,
        )?;
        Ok(Outcome::Dispatched(dispatch))
    }

    /// Copy of the activity currently open on `key`.
    pub fn current_activity(&self, key: ContextKey) -> Option<Activity> {
        self.contexts
            .get(&key)
            .and_then(|state| state.activity.clone())
    }

    /// Number of contexts with an open activity.
    pub fn open_activities(&self) -> usize {
        self.contexts
            .iter()
            .filter(|state| state.activity.is_some())
            .count()
    }

    fn controller(&self) -> ActivityController<'_> {
        ActivityController {
            sink: self.sink.as_ref(),
            usage: self.usage.as_ref(),
            source: &self.source,
            snapshot_category: &self.config.snapshot_category,
        }
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        self.stop();
    }
}

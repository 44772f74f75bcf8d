//! Routing of finished events: standalone datagram, attachment to the open
//! activity, or a wrapping activity that carries a usage snapshot.

use logtrack_activity::{
    Activity, ActivityStatus, ErrorInfo, Trackable, Timestamp, TrackingEvent,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::trace;

use crate::config::TrackerConfig;
use crate::controller::ActivityController;
use crate::error::TrackError;

/// Where an event went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Sent to the sink on its own.
    Datagram,
    /// Wrapped in a single-event activity that was flushed right away.
    Wrapped { activity_id: u64 },
    /// Attached to the open activity, which now has `children` events.
    Attached { children: usize },
    /// Attached, then the activity reached its size limit and was flushed.
    AttachedAndClosed { children: usize },
}

#[derive(Debug)]
pub struct DispatchPolicy {
    metrics_on_exception: bool,
    metrics_frequency_ms: i64,
    max_activity_size: usize,
    /// Record time (ms) of the last usage sample; 0 until the first one.
    last_snapshot_ms: AtomicI64,
}

impl DispatchPolicy {
    pub fn new(metrics_on_exception: bool, metrics_frequency: Duration, max_activity_size: usize) -> Self {
        Self {
            metrics_on_exception,
            metrics_frequency_ms: i64::try_from(metrics_frequency.as_millis()).unwrap_or(i64::MAX),
            max_activity_size: max_activity_size.max(1),
            last_snapshot_ms: AtomicI64::new(0),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.metrics_on_exception,
            config.metrics_frequency(),
            config.max_activity_size,
        )
    }

    pub fn last_snapshot(&self) -> Timestamp {
        Timestamp::from_millis(self.last_snapshot_ms.load(Ordering::Acquire))
    }

    /// Decide whether a usage sample is due and, if so, claim it.
    fn claim_sample(&self, exception_present: bool, now: Timestamp) -> bool {
        let now_ms = now.as_millis();
        if exception_present && self.metrics_on_exception {
            self.last_snapshot_ms.store(now_ms, Ordering::Release);
            return true;
        }
        let last = self.last_snapshot_ms.load(Ordering::Acquire);
        if now_ms.saturating_sub(last) <= self.metrics_frequency_ms {
            return false;
        }
        // only one concurrent caller takes the periodic sample
        self.last_snapshot_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Route `event` for the context whose current activity is `slot`.
    ///
    /// `error` is the record's error: it forces a usage sample and decides how
    /// an activity closed at its size limit ends. `thread_name` names a
    /// wrapping activity and `resource` (the call-site class) becomes its
    /// resource. `now` is the record time.
    #[allow(clippy::too_many_arguments)]
    pub fn dispatch(
        &self,
        event: TrackingEvent,
        slot: &mut Option<Activity>,
        error: Option<&ErrorInfo>,
        now: Timestamp,
        thread_name: &str,
        resource: Option<&str>,
        controller: &ActivityController<'_>,
    ) -> Result<Dispatch, TrackError> {
        let Some(mut activity) = slot.take() else {
            if self.claim_sample(error.is_some(), now) {
                return self.wrap(event, thread_name, resource, controller);
            }
            trace!(target: "logtrack::dispatch", operation = %event.operation, "datagram");
            controller.sink.accept(Trackable::Event(event))?;
            return Ok(Dispatch::Datagram);
        };

        let children = activity.attach(event);
        if children < self.max_activity_size {
            *slot = Some(activity);
            return Ok(Dispatch::Attached { children });
        }

        trace!(
            target: "logtrack::dispatch",
            name = %activity.name,
            children,
            "activity reached its size limit"
        );
        if let Some(error) = error {
            activity.exception = Some(error.clone());
        }
        let status = ActivityStatus::closing(activity.exception.is_some());
        controller.flush(activity, status, now)?;
        Ok(Dispatch::AttachedAndClosed { children })
    }

    fn wrap(
        &self,
        event: TrackingEvent,
        thread_name: &str,
        resource: Option<&str>,
        controller: &ActivityController<'_>,
    ) -> Result<Dispatch, TrackError> {
        let mut activity = Activity::new(thread_name, event.severity, event.source.clone(), event.start);
        activity.resource = resource.map(str::to_string);
        activity.exception = event.exception.clone();
        let status = ActivityStatus::closing(activity.exception.is_some());
        let end = event.end;
        let activity_id = activity.id;

        activity.attach(event);
        trace!(target: "logtrack::dispatch", activity_id, "wrapping event for usage sample");
        controller.flush(activity, status, end)?;
        Ok(Dispatch::Wrapped { activity_id })
    }
}

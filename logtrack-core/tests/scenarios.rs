use logtrack_activity::{
    ActivityStatus, ChannelSink, ErrorInfo, JsonLinesSink, NoUsage, Property, PropertyValue,
    SinkError, Snapshot, Timestamp, Trackable, TrackingEvent, USAGE_CATEGORY, UsageSampler,
};
use logtrack_core::{
    CallSite, ContextKey, ControlOutcome, Dispatch, LogRecord, Outcome, RecordLevel, TrackError,
    Tracker, TrackerConfig,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

const T0: i64 = 1_700_000_000_000;
const SECOND: i64 = 1_000;

struct Harness {
    tracker: Tracker,
    rx: UnboundedReceiver<Trackable>,
    key: ContextKey,
}

impl Harness {
    fn new(config: TrackerConfig) -> Self {
        let (sink, rx) = ChannelSink::new();
        let tracker = Tracker::new(config, Arc::new(sink)).with_usage_sampler(Arc::new(NoUsage));
        tracker.start().unwrap();
        Self {
            tracker,
            rx,
            key: ContextKey::from_raw(7_000),
        }
    }

    fn record(&self, level: RecordLevel, message: &str, at_ms: i64) -> LogRecord {
        LogRecord::new(level, message)
            .with_thread_name("worker-1")
            .with_timestamp_millis(at_ms)
            .in_context(self.key)
            .with_call_site(CallSite {
                class: Some("shop::checkout".to_string()),
                method: Some("place_order".to_string()),
                file: Some("src/checkout.rs".to_string()),
                line: Some(12),
            })
    }

    fn log(&self, message: &str, at_ms: i64) -> Outcome {
        self.tracker
            .append(&self.record(RecordLevel::Info, message, at_ms))
            .unwrap()
    }

    fn drain(&mut self) -> Vec<Trackable> {
        std::iter::from_fn(|| self.rx.try_recv().ok()).collect()
    }

    /// Take the first usage sample so that later plain events are datagrams.
    fn prime(&mut self, at_ms: i64) {
        assert!(matches!(
            self.log("warm up", at_ms),
            Outcome::Dispatched(Dispatch::Wrapped { .. })
        ));
        self.drain();
    }
}

fn events(items: &[Trackable]) -> Vec<&TrackingEvent> {
    items
        .iter()
        .flat_map(|item| match item {
            Trackable::Event(event) => vec![event],
            Trackable::Activity(activity) => activity.events.iter().collect(),
        })
        .collect()
}

#[test]
fn checkout_activity_lifecycle() {
    let mut h = Harness::new(TrackerConfig::default().with_source_name("shop"));

    let outcome = h.log("#beg=Checkout", T0);
    assert_eq!(
        outcome,
        Outcome::Control(vec![ControlOutcome::Begun {
            name: "Checkout".to_string()
        }])
    );
    let open = h.tracker.current_activity(h.key).unwrap();
    assert_eq!(open.name, "Checkout");
    assert_eq!(open.status, ActivityStatus::Running);
    assert_eq!(open.source.name, "shop");

    let outcome = h.log("#opn=save #rsn=order.json #rcd=0", T0 + 10);
    assert_eq!(outcome, Outcome::Dispatched(Dispatch::Attached { children: 1 }));
    let open = h.tracker.current_activity(h.key).unwrap();
    assert_eq!(open.child_count(), 1);
    let event = &open.events[0];
    assert_eq!(event.operation, "save");
    assert_eq!(event.resource.as_deref(), Some("order.json"));
    assert_eq!(event.reason_code, 0);
    assert!(h.drain().is_empty());

    h.log("#end=Checkout", T0 + 20);
    assert!(h.tracker.current_activity(h.key).is_none());

    let items = h.drain();
    assert_eq!(items.len(), 1);
    let closed = items[0].as_activity().unwrap();
    assert_eq!(closed.status, ActivityStatus::End);
    assert_eq!(closed.start, Timestamp::from_millis(T0));
    assert_eq!(closed.end, Some(Timestamp::from_millis(T0 + 20)));
    assert_eq!(closed.child_count(), 1);
}

#[test]
fn periodic_usage_sampling() {
    let mut h = Harness::new(TrackerConfig::default().with_metrics_frequency(60));
    h.prime(T0);

    assert_eq!(
        h.log("plain", T0 + 30 * SECOND),
        Outcome::Dispatched(Dispatch::Datagram)
    );
    let outcome = h.log("plain", T0 + 61 * SECOND);
    assert!(matches!(outcome, Outcome::Dispatched(Dispatch::Wrapped { .. })));

    let items = h.drain();
    assert_eq!(items.len(), 2);
    assert!(items[0].as_event().is_some());
    let wrapper = items[1].as_activity().unwrap();
    assert_eq!(wrapper.name, "worker-1");
    assert_eq!(wrapper.resource.as_deref(), Some("shop::checkout"));
    assert_eq!(wrapper.child_count(), 1);
}

#[test]
fn typed_overflow_property() {
    let mut h = Harness::new(TrackerConfig::default());
    h.prime(T0);

    h.log("#%l/orderNo=12345", T0 + 1);
    let items = h.drain();
    let event = items[0].as_event().unwrap();
    let snapshot = event.snapshot.as_ref().unwrap();
    assert_eq!(
        snapshot.properties,
        vec![Property::new("orderNo", PropertyValue::Long(12345))]
    );
    assert_eq!(snapshot.category, "Log");
}

#[test]
fn first_event_on_context_has_zero_elapsed() {
    let mut h = Harness::new(TrackerConfig::default());
    h.log("first", T0);
    let items = h.drain();
    let event = events(&items)[0].clone();
    assert_eq!(event.start, Timestamp::from_millis(T0));
    assert_eq!(event.end, Timestamp::from_millis(T0));
    assert_eq!(event.tag.as_deref(), Some("worker-1"));
    assert_eq!(event.location.as_deref(), Some("src/checkout.rs:12"));
}

#[test]
fn explicit_start_and_end_are_exact() {
    let mut h = Harness::new(TrackerConfig::default());
    h.prime(T0);
    h.log("#stt=1690000000000000 #ent=1690000000250000", T0 + 5);
    let items = h.drain();
    let event = items[0].as_event().unwrap();
    assert_eq!(event.start, Timestamp::from_usec(1_690_000_000_000_000));
    assert_eq!(event.end, Timestamp::from_usec(1_690_000_000_250_000));
}

#[test]
fn end_without_activity_twice() {
    let mut h = Harness::new(TrackerConfig::default());
    for at in [T0, T0 + 1] {
        assert_eq!(
            h.log("#end=", at),
            Outcome::Control(vec![ControlOutcome::NothingOpen])
        );
    }
    assert!(h.drain().is_empty());
}

#[test]
fn activity_force_closed_at_max_size() {
    let mut h = Harness::new(TrackerConfig::default().with_max_activity_size(3));
    h.prime(T0);
    h.log("#beg=Batch", T0 + 1);

    assert_eq!(h.log("one", T0 + 2), Outcome::Dispatched(Dispatch::Attached { children: 1 }));
    assert_eq!(h.log("two", T0 + 3), Outcome::Dispatched(Dispatch::Attached { children: 2 }));
    assert_eq!(
        h.log("three", T0 + 4),
        Outcome::Dispatched(Dispatch::AttachedAndClosed { children: 3 })
    );
    assert!(h.tracker.current_activity(h.key).is_none());

    let items = h.drain();
    assert_eq!(items.len(), 1);
    let closed = items[0].as_activity().unwrap();
    assert_eq!(closed.child_count(), 3);
    assert_eq!(closed.end, Some(Timestamp::from_millis(T0 + 4)));

    assert_eq!(h.log("four", T0 + 5), Outcome::Dispatched(Dispatch::Datagram));
}

#[test]
fn invalid_value_leaves_no_trace() {
    let mut h = Harness::new(TrackerConfig::default());
    h.log("#beg=Batch", T0);

    let err = h
        .tracker
        .append(&h.record(RecordLevel::Info, "#opn=save #rcd=abc", T0 + 1))
        .unwrap_err();
    assert!(matches!(err, TrackError::InvalidValue { ref key, .. } if key == "rcd"));
    assert_eq!(h.tracker.current_activity(h.key).unwrap().child_count(), 0);
    assert!(h.drain().is_empty());
}

#[test]
fn error_record_closes_activity_with_exception() {
    let mut h = Harness::new(TrackerConfig::default());
    h.log("#beg=Pay", T0);
    let record = h
        .record(RecordLevel::Error, "#end=Pay", T0 + 1)
        .with_error(ErrorInfo::new("card declined"));
    h.tracker.append(&record).unwrap();

    let items = h.drain();
    let closed = items[0].as_activity().unwrap();
    assert_eq!(closed.status, ActivityStatus::Exception);
    assert_eq!(closed.exception, Some(ErrorInfo::new("card declined")));
}

#[test]
fn contexts_do_not_share_activities() {
    let h = Harness::new(TrackerConfig::default());
    let other = ContextKey::from_raw(9_000);
    h.log("#beg=Here", T0);

    let record = LogRecord::new(RecordLevel::Info, "#beg=There")
        .with_timestamp_millis(T0)
        .in_context(other);
    h.tracker.append(&record).unwrap();

    assert_eq!(h.tracker.current_activity(h.key).map(|a| a.name), Some("Here".to_string()));
    assert_eq!(h.tracker.current_activity(other).map(|a| a.name), Some("There".to_string()));
    assert_eq!(h.tracker.open_activities(), 2);
}

#[test]
fn context_map_annotations() {
    let mut h = Harness::new(TrackerConfig::default());
    h.prime(T0);
    let record = h
        .record(RecordLevel::Info, "#usr=bob", T0 + 1)
        .with_context("usr", "alice")
        .with_context("cid", "req-42");
    h.tracker.append(&record).unwrap();

    let items = h.drain();
    let event = items[0].as_event().unwrap();
    assert_eq!(event.user.as_deref(), Some("bob"));
    assert_eq!(event.correlator.as_deref(), Some("req-42"));
}

#[test]
fn records_are_ignored_before_start() {
    let (sink, mut rx) = ChannelSink::new();
    let tracker = Tracker::new(TrackerConfig::default(), Arc::new(sink));
    let outcome = tracker
        .append(&LogRecord::new(RecordLevel::Info, "#beg=Early"))
        .unwrap();
    assert_eq!(outcome, Outcome::Disabled);
    assert!(rx.try_recv().is_err());
}

#[test]
fn failed_start_leaves_tracker_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let sink = JsonLinesSink::file(dir.path().join("missing").join("out.jsonl"));
    let tracker = Tracker::new(TrackerConfig::default(), Arc::new(sink));

    let err = tracker.start().unwrap_err();
    assert!(matches!(err, TrackError::Sink(SinkError::Open { .. })));
    assert!(!tracker.is_started());
    assert_eq!(
        tracker.append(&LogRecord::new(RecordLevel::Info, "hello")).unwrap(),
        Outcome::Disabled
    );
}

#[test]
fn stop_flushes_open_activities() {
    let mut h = Harness::new(TrackerConfig::default());
    h.log("#beg=LongRunning", T0);
    h.tracker.stop();

    let items = h.drain();
    assert_eq!(items.len(), 1);
    let closed = items[0].as_activity().unwrap();
    assert_eq!(closed.name, "LongRunning");
    assert_eq!(closed.status, ActivityStatus::End);
    assert_eq!(h.tracker.open_activities(), 0);
    assert_eq!(h.log("after stop", T0 + 1), Outcome::Disabled);
}

#[test]
fn sink_failure_drops_the_closing_activity() {
    let (sink, rx) = ChannelSink::new();
    let tracker = Tracker::new(TrackerConfig::default(), Arc::new(sink))
        .with_usage_sampler(Arc::new(NoUsage));
    tracker.start().unwrap();
    let key = ContextKey::from_raw(8_000);
    let log = |message: &str| {
        tracker.append(&LogRecord::new(RecordLevel::Info, message).in_context(key))
    };

    log("#beg=Upload").unwrap();
    log("#opn=chunk").unwrap();
    drop(rx);

    let err = log("#end=Upload").unwrap_err();
    assert!(matches!(err, TrackError::Sink(SinkError::Closed)));
    assert_eq!(tracker.open_activities(), 0);
    assert_eq!(tracker.current_activity(key), None);
    assert_eq!(
        log("#beg=Retry").unwrap(),
        Outcome::Control(vec![ControlOutcome::Begun {
            name: "Retry".to_string()
        }])
    );
}

struct FixedUsage;

impl UsageSampler for FixedUsage {
    fn sample(&self, at: Timestamp) -> Option<Snapshot> {
        let mut snapshot = Snapshot::new(USAGE_CATEGORY, "process", at);
        snapshot.add(Property::new("process.memory", PropertyValue::Long(1024)));
        Some(snapshot)
    }
}

#[test]
fn flushed_activities_carry_usage() {
    let (sink, mut rx) = ChannelSink::new();
    let tracker = Tracker::new(TrackerConfig::default(), Arc::new(sink))
        .with_usage_sampler(Arc::new(FixedUsage));
    tracker.start().unwrap();

    let record = LogRecord::new(RecordLevel::Info, "hello").with_timestamp_millis(T0);
    tracker.append(&record).unwrap();

    let item = rx.try_recv().unwrap();
    let wrapper = item.as_activity().unwrap();
    let usage = wrapper
        .snapshots
        .iter()
        .find(|s| s.category == USAGE_CATEGORY)
        .unwrap();
    assert_eq!(usage.timestamp, wrapper.end.unwrap());
    assert!(usage.get("process.memory").is_some());
}

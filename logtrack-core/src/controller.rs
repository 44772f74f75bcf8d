//! Begin/end handling for the per-context current activity.

use logtrack_activity::{
    Activity, ActivityStatus, ErrorInfo, EventSink, OpLevel, Property, Snapshot, Source,
    Timestamp, Trackable, UsageSampler,
};
use tracing::{debug, trace, warn};

use crate::annotation::{AttrKey, AttributeMap, ReservedKey};
use crate::builder::parse_enum;
use crate::classify::{Instruction, classify};
use crate::error::TrackError;
use crate::record::RecordLevel;

/// What an activity instruction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlOutcome {
    Begun { name: String },
    /// A begin arrived while `name` was still open; it was closed first.
    ImplicitlyClosed { name: String },
    Ended { name: String, status: ActivityStatus },
    /// End requested with no open activity.
    NothingOpen,
    /// End requested for a different activity than the open one.
    NameMismatch { open: String, requested: String },
}

/// Opens, closes and flushes activities.
pub struct ActivityController<'a> {
    pub sink: &'a dyn EventSink,
    pub usage: &'a dyn UsageSampler,
    /// Source of newly opened activities
    pub source: &'a Source,
    pub snapshot_category: &'a str,
}

impl ActivityController<'_> {
    /// Apply a begin/end instruction to `slot`, the context's current activity.
    ///
    /// `now` is the record time. Attributes other than the control keys are
    /// applied to the activity being ended and to the one being begun.
    pub fn process_activity_attrs(
        &self,
        slot: &mut Option<Activity>,
        attrs: &AttributeMap,
        level: RecordLevel,
        error: Option<&ErrorInfo>,
        now: Timestamp,
    ) -> Result<Vec<ControlOutcome>, TrackError> {
        let Instruction::Activity { begin, end } = classify(attrs) else {
            return Ok(Vec::new());
        };
        let update = ActivityUpdate::from_attrs(attrs)?;
        let mut outcomes = Vec::new();

        if let Some(requested) = end {
            match slot.take() {
                None => {
                    debug!(target: "logtrack::activity", name = requested, "end without an open activity");
                    outcomes.push(ControlOutcome::NothingOpen);
                }
                Some(open) if !requested.is_empty() && open.name != requested => {
                    warn!(
                        target: "logtrack::activity",
                        open = %open.name,
                        requested,
                        "end does not match the open activity, ignoring"
                    );
                    outcomes.push(ControlOutcome::NameMismatch {
                        open: open.name.clone(),
                        requested: requested.to_string(),
                    });
                    *slot = Some(open);
                }
                Some(mut open) => {
                    update.apply(&mut open, self.snapshot_category, now);
                    if let Some(error) = error {
                        open.exception = Some(error.clone());
                    }
                    let status = ActivityStatus::closing(open.exception.is_some());
                    let name = open.name.clone();
                    self.flush(open, status, now)?;
                    outcomes.push(ControlOutcome::Ended { name, status });
                }
            }
        }

        if let Some(name) = begin {
            if let Some(previous) = slot.take() {
                debug!(
                    target: "logtrack::activity",
                    open = %previous.name,
                    "begin while an activity is open, closing it first"
                );
                let name = previous.name.clone();
                self.flush(previous, ActivityStatus::End, now)?;
                outcomes.push(ControlOutcome::ImplicitlyClosed { name });
            }

            let name = if name.is_empty() { self.source.name.as_str() } else { name };
            let mut activity = Activity::new(name, level.severity(), self.source.clone(), now);
            update.apply(&mut activity, self.snapshot_category, now);
            trace!(target: "logtrack::activity", name, id = activity.id, "activity started");
            outcomes.push(ControlOutcome::Begun {
                name: activity.name.clone(),
            });
            *slot = Some(activity);
        }

        Ok(outcomes)
    }

    /// Stop `activity`, attach a usage snapshot and hand it to the sink.
    ///
    /// The activity is consumed either way: if the sink rejects it, it is
    /// lost together with its buffered events and the error is returned.
    pub fn flush(
        &self,
        mut activity: Activity,
        status: ActivityStatus,
        end: Timestamp,
    ) -> Result<(), TrackError> {
        activity.stop(status, end);
        if let Some(usage) = self.usage.sample(end) {
            activity.add_snapshot(usage);
        }
        trace!(
            target: "logtrack::activity",
            name = %activity.name,
            children = activity.child_count(),
            ?status,
            "activity flushed"
        );
        self.sink.accept(Trackable::Activity(activity))?;
        Ok(())
    }
}

/// Attribute overrides for an activity, coerced before any state changes.
#[derive(Debug, Default)]
struct ActivityUpdate {
    source_name: Option<String>,
    user: Option<String>,
    correlator: Option<String>,
    tag: Option<String>,
    location: Option<String>,
    resource: Option<String>,
    severity: Option<OpLevel>,
    exception: Option<String>,
    properties: Vec<Property>,
}

impl ActivityUpdate {
    fn from_attrs(attrs: &AttributeMap) -> Result<Self, TrackError> {
        let mut update = Self::default();
        for (key, attr) in attrs.iter() {
            let value = attr.value.as_str();
            match key {
                AttrKey::Reserved(ReservedKey::App) => update.source_name = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Usr) => update.user = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Cid) => update.correlator = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Tag) => update.tag = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Loc) => update.location = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Rsn) => update.resource = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Exc) => update.exception = Some(value.to_string()),
                AttrKey::Reserved(ReservedKey::Sev) => {
                    update.severity = Some(parse_enum(ReservedKey::Sev, value, "severity")?)
                }
                // event-only keys have no meaning on an activity
                AttrKey::Reserved(_) => {}
                AttrKey::User(name) => update.properties.push(attr.to_property(name)?),
            }
        }
        Ok(update)
    }

    fn apply(&self, activity: &mut Activity, snapshot_category: &str, now: Timestamp) {
        if let Some(name) = &self.source_name {
            activity.source.name = name.clone();
        }
        let fields = [
            (&mut activity.user, &self.user),
            (&mut activity.correlator, &self.correlator),
            (&mut activity.tag, &self.tag),
            (&mut activity.location, &self.location),
            (&mut activity.resource, &self.resource),
        ];
        for (field, value) in fields {
            if value.is_some() {
                field.clone_from(value);
            }
        }
        if let Some(severity) = self.severity {
            activity.severity = severity;
        }
        if let Some(message) = &self.exception {
            activity.exception = Some(ErrorInfo::new(message.as_str()));
        }
        if !self.properties.is_empty() {
            let mut snapshot = Snapshot::new(snapshot_category, &activity.name, now);
            snapshot.properties = self.properties.clone();
            activity.add_snapshot(snapshot);
        }
    }
}

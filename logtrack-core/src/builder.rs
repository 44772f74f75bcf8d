//! Turns a log record and its attributes into a finished [`TrackingEvent`].

use logtrack_activity::{
    ErrorInfo, OpCompCode, OpLevel, OpType, Property, Snapshot, Source, SourceType, Timestamp,
    TrackingEvent, next_id, parse_code,
};

use crate::annotation::{AttrKey, AttributeMap, ReservedKey};
use crate::error::TrackError;
use crate::record::LogRecord;

/// Tracker-wide settings the builder needs.
#[derive(Debug, Clone, Copy)]
pub struct EventDefaults<'a> {
    /// Source name when the record has no logger identity.
    pub source_name: &'a str,
    pub source_type: SourceType,
    pub snapshot_category: &'a str,
}

/// Event under construction. Every field starts from the record and is
/// overridden by explicit attributes.
struct EventDraft {
    operation: Option<String>,
    op_type: OpType,
    severity: OpLevel,
    comp_code: OpCompCode,
    reason_code: i32,
    source: Source,
    message: String,
    resource: Option<String>,
    user: Option<String>,
    tag: Option<String>,
    correlator: Option<String>,
    location: Option<String>,
    message_age_usec: i64,
    elapsed_usec: i64,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    exception: Option<ErrorInfo>,
    properties: Vec<Property>,
}

impl EventDraft {
    fn from_record(record: &LogRecord, elapsed_usec: i64, defaults: &EventDefaults) -> Self {
        let call_site = record.call_site.as_ref();
        Self {
            operation: call_site.and_then(|site| site.method.clone()),
            op_type: OpType::Event,
            severity: record.level.severity(),
            comp_code: record.level.completion_code(),
            reason_code: 0,
            source: Source::new(
                record.logger.as_deref().unwrap_or(defaults.source_name),
                defaults.source_type,
            ),
            message: record.message.clone(),
            resource: call_site.and_then(|site| site.class.clone()),
            user: None,
            tag: Some(record.thread_name.clone()),
            correlator: None,
            location: call_site.and_then(|site| site.location()),
            message_age_usec: 0,
            elapsed_usec,
            start: None,
            end: None,
            exception: record.error.clone(),
            properties: Vec::new(),
        }
    }

    fn apply(&mut self, key: ReservedKey, value: &str) -> Result<(), TrackError> {
        match key {
            ReservedKey::Cid => self.correlator = Some(value.to_string()),
            ReservedKey::Tag => self.tag = Some(value.to_string()),
            ReservedKey::Loc => self.location = Some(value.to_string()),
            ReservedKey::Rsn => self.resource = Some(value.to_string()),
            ReservedKey::Usr => self.user = Some(value.to_string()),
            ReservedKey::Opn => self.operation = Some(value.to_string()),
            ReservedKey::Msg => self.message = value.to_string(),
            ReservedKey::App => self.source.name = value.to_string(),
            ReservedKey::Elt => self.elapsed_usec = parse_int(key, value)?,
            ReservedKey::Age => self.message_age_usec = parse_int(key, value)?,
            ReservedKey::Stt => self.start = explicit_time(parse_int(key, value)?),
            ReservedKey::Ent => self.end = explicit_time(parse_int(key, value)?),
            ReservedKey::Rcd => self.reason_code = parse_int(key, value)?,
            ReservedKey::Ccd => self.comp_code = parse_enum(key, value, "completion code")?,
            ReservedKey::Sev => self.severity = parse_enum(key, value, "severity")?,
            ReservedKey::Opt => self.op_type = parse_enum(key, value, "operation type")?,
            ReservedKey::Exc => {
                let causes = self
                    .exception
                    .take()
                    .map(|error| error.causes)
                    .unwrap_or_default();
                self.exception = Some(ErrorInfo::new(value).with_causes(causes));
            }
            ReservedKey::Beg | ReservedKey::End => {}
        }
        Ok(())
    }

    fn finish(self, record: &LogRecord, defaults: &EventDefaults) -> TrackingEvent {
        let elapsed = self.elapsed_usec.max(0);
        let start = self
            .start
            .unwrap_or_else(|| record.timestamp.add_usec(-elapsed));
        let end = self
            .end
            .unwrap_or_else(|| start.add_usec(elapsed))
            .max(start);

        let operation = self
            .operation
            .unwrap_or_else(|| record.thread_name.clone());
        let snapshot = (!self.properties.is_empty()).then(|| {
            let mut snapshot = Snapshot::new(defaults.snapshot_category, &operation, end);
            snapshot.properties = self.properties;
            snapshot
        });

        TrackingEvent {
            id: next_id(),
            operation,
            op_type: self.op_type,
            severity: self.severity,
            comp_code: self.comp_code,
            reason_code: self.reason_code,
            source: self.source,
            message: self.message,
            resource: self.resource,
            user: self.user,
            tag: self.tag,
            correlator: self.correlator,
            location: self.location,
            message_age_usec: self.message_age_usec,
            start,
            end,
            exception: self.exception,
            snapshot,
        }
    }
}

/// Build the event for a record on the event path.
///
/// `elapsed_usec` is the gap since the previous record on the same context.
/// It is used for the default start and end times unless `elt`, `stt` or
/// `ent` override them. Fails only when an explicit structured value cannot
/// be coerced.
pub fn build_event(
    attrs: &AttributeMap,
    record: &LogRecord,
    elapsed_usec: i64,
    defaults: &EventDefaults,
) -> Result<TrackingEvent, TrackError> {
    let mut draft = EventDraft::from_record(record, elapsed_usec, defaults);
    for (key, attr) in attrs.iter() {
        match key {
            AttrKey::Reserved(key) => draft.apply(*key, &attr.value)?,
            AttrKey::User(name) => draft.properties.push(attr.to_property(name)?),
        }
    }
    Ok(draft.finish(record, defaults))
}

/// Non-positive explicit times mean "not given".
fn explicit_time(usec: i64) -> Option<Timestamp> {
    (usec > 0).then(|| Timestamp::from_usec(usec))
}

fn parse_int<T: std::str::FromStr>(key: ReservedKey, value: &str) -> Result<T, TrackError> {
    value
        .trim()
        .parse()
        .map_err(|_| TrackError::invalid_value(key, value, "an integer"))
}

pub(crate) fn parse_enum<T>(key: ReservedKey, value: &str, expected: &str) -> Result<T, TrackError>
where
    T: std::str::FromStr + TryFrom<u8>,
{
    parse_code(value).ok_or_else(|| TrackError::invalid_value(key, value, expected))
}

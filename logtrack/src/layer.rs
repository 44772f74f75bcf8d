use logtrack_activity::ErrorInfo;
use logtrack_core::{CallSite, LogRecord, RecordLevel, Tracker};
use std::fmt;
use std::sync::Arc;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    span,
};
use tracing_subscriber::{Layer, layer, registry::LookupSpan};

/// Fields recorded on a span, handed down to events inside it as ambient context.
#[derive(Debug, Default, Clone)]
struct SpanContext {
    fields: Vec<(String, String)>,
}

impl SpanContext {
    fn merge(&mut self, fields: Vec<(String, String)>) {
        for (key, value) in fields {
            match self.fields.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => self.fields.push((key, value)),
            }
        }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    error: Option<ErrorInfo>,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = Some(value),
            name if name.starts_with("log.") => {}
            name => self.fields.push((name.to_string(), value)),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == "error" {
            self.error = Some(ErrorInfo::from_error(value));
        } else {
            self.push(field, value.to_string());
        }
    }
}

/// Feeds every `tracing` event to a [`Tracker`].
///
/// The event's message is the annotated log line. Module path, innermost span
/// and file/line form the call site. Span fields (outermost first) and the
/// event's other fields become the ambient context, so a span created with
/// `cid = "req-1"` correlates every event inside it. An `error` field is
/// attached as the record's error.
///
/// Events whose target starts with `logtrack` are skipped.
pub struct TrackingLayer {
    tracker: Arc<Tracker>,
}

impl TrackingLayer {
    pub fn new(tracker: Arc<Tracker>) -> Self {
        Self { tracker }
    }

    pub fn tracker(&self) -> &Arc<Tracker> {
        &self.tracker
    }
}

impl<S> Layer<S> for TrackingLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: layer::Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanContext {
            fields: visitor.fields,
        });
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: layer::Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);

        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<SpanContext>() {
            Some(context) => context.merge(visitor.fields),
            None => extensions.insert(SpanContext {
                fields: visitor.fields,
            }),
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: layer::Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with("logtrack") {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut context = SpanContext::default();
        let mut innermost = None;
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanContext>() {
                    context.merge(fields.fields.clone());
                }
                innermost = Some(span.name());
            }
        }
        context.merge(visitor.fields);

        let module = metadata.module_path();
        let method = innermost.or_else(|| module.and_then(|path| path.rsplit("::").next()));
        let call_site = CallSite {
            class: module.map(str::to_string),
            method: method.map(str::to_string),
            file: metadata.file().map(str::to_string),
            line: metadata.line(),
        };

        let mut record = LogRecord::new(
            RecordLevel::from(*metadata.level()),
            visitor.message.unwrap_or_default(),
        )
        .with_logger(metadata.target())
        .with_call_site(call_site);
        record.context = context.fields;
        record.error = visitor.error;

        if let Err(e) = self.tracker.append(&record) {
            tracing::warn!(target: "logtrack::status", "dropped log record: {e}");
        }
    }
}

//! Tracing layer routing events into process loggers.
//!
//! Code running inside a span that carries `operation_id` and `activity_id`
//! fields has its events captured by the matching process logger:
//!
//! ```ignore
//! let span = tracing::info_span!("step", operation_id = %op, activity_id = %act, space = %space);
//! async move {
//!     tracing::info!("uploading application");
//! }
//! .instrument(span)
//! .await;
//! ```
//!
//! `space`, `namespace` and `channel` are optional span fields. The event
//! target becomes the call origin, so the registry's origin filter applies.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

use crate::event::LogLevel;
use crate::logger::LogSink;
use crate::registry::LoggerRegistry;

/// Targets involved in capturing and persisting process logs. Never
/// captured, whatever the configured origin filter says.
const INTERNAL_TARGETS: &[&str] = &[
    "oplog_capture",
    "oplog_storage",
    "oplog_db_memory",
    "oplog_db_postgres",
    "sqlx",
];

fn is_internal(target: &str) -> bool {
    INTERNAL_TARGETS.iter().any(|prefix| match target.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with("::"),
        None => false,
    })
}

/// Process identity recorded on a span.
#[derive(Debug, Clone, Default)]
struct ProcessScope {
    space: Option<String>,
    namespace: Option<String>,
    operation_id: Option<String>,
    activity_id: Option<String>,
    channel: Option<String>,
}

impl ProcessScope {
    fn is_empty(&self) -> bool {
        self.space.is_none()
            && self.namespace.is_none()
            && self.operation_id.is_none()
            && self.activity_id.is_none()
            && self.channel.is_none()
    }

    fn is_complete(&self) -> bool {
        self.operation_id.is_some() && self.activity_id.is_some()
    }
}

impl Visit for ProcessScope {
    fn record_str(&mut self, field: &Field, value: &str) {
        let slot = match field.name() {
            "space" => &mut self.space,
            "namespace" => &mut self.namespace,
            "operation_id" | "correlation_id" => &mut self.operation_id,
            "activity_id" | "task_id" => &mut self.activity_id,
            "channel" => &mut self.channel,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, format!("{value:?}").trim_matches('"'));
    }
}

/// Collects the message and the remaining fields as `key=value` pairs.
#[derive(Default)]
struct EventText {
    message: String,
    fields: String,
}

impl EventText {
    fn into_text(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut chain = value.to_string();
        let mut source = value.source();
        while let Some(cause) = source {
            let _ = write!(chain, ": {cause}");
            source = cause.source();
        }
        self.push_field(field.name(), format_args!("{chain}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Routes events emitted inside process-scoped spans to the registry.
#[derive(Debug, Clone)]
pub struct ProcessLogLayer {
    registry: Arc<LoggerRegistry>,
    default_space: String,
    default_channel: String,
    min_level: Level,
}

impl ProcessLogLayer {
    pub fn new(registry: Arc<LoggerRegistry>, default_channel: impl Into<String>) -> Self {
        Self {
            registry,
            default_space: String::new(),
            default_channel: default_channel.into(),
            min_level: Level::TRACE,
        }
    }

    /// Space used when a span does not carry one.
    pub fn with_default_space(mut self, space: impl Into<String>) -> Self {
        self.default_space = space.into();
        self
    }

    /// Set the least severe level that is captured.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for ProcessLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut scope = ProcessScope::default();
        attrs.record(&mut scope);
        if scope.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(scope);
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<ProcessScope>() {
            Some(scope) => values.record(scope),
            None => {
                let mut scope = ProcessScope::default();
                values.record(&mut scope);
                if !scope.is_empty() {
                    extensions.insert(scope);
                }
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.level() > &self.min_level
            || is_internal(metadata.target())
            || !self.registry.filter().accepts(Some(metadata.target()))
        {
            return;
        }

        // Innermost span wins for each field.
        let mut merged = ProcessScope::default();
        let Some(spans) = ctx.event_scope(event) else {
            return;
        };
        for span in spans {
            let extensions = span.extensions();
            let Some(scope) = extensions.get::<ProcessScope>() else {
                continue;
            };
            for (slot, value) in [
                (&mut merged.space, &scope.space),
                (&mut merged.namespace, &scope.namespace),
                (&mut merged.operation_id, &scope.operation_id),
                (&mut merged.activity_id, &scope.activity_id),
                (&mut merged.channel, &scope.channel),
            ] {
                if slot.is_none() {
                    slot.clone_from(value);
                }
            }
            if merged.is_complete() && merged.space.is_some() && merged.channel.is_some() {
                break;
            }
        }
        if !merged.is_complete() {
            return;
        }

        let mut text = EventText::default();
        event.record(&mut text);

        let handle = self.registry.get_or_create_in(
            merged.space.as_deref().unwrap_or(&self.default_space),
            merged.namespace.as_deref(),
            merged.operation_id.as_deref().unwrap_or_default(),
            merged.activity_id.as_deref().unwrap_or_default(),
            merged.channel.as_deref().unwrap_or(&self.default_channel),
        );
        handle.record(
            LogLevel::from(metadata.level()),
            &text.into_text(),
            Some(metadata.target()),
            None,
        );
    }
}

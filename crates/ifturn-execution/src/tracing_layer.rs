//! Tracing setup and a layer that streams turn events to a channel.
//!
//! `TurnEventLayer` lets an outer host (a tool server, a UI) follow turns as
//! they progress without parsing log output.

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Only events from these targets are forwarded.
const FORWARDED_TARGET_PREFIX: &str = "ifturn";

/// An event forwarded to the host.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TurnEvent {
    /// Event target (e.g. "ifturn_execution::executor")
    pub target: String,
    /// Log level (INFO, DEBUG, WARN, ERROR)
    pub level: String,
    pub message: String,
    pub fields: HashMap<String, Value>,
    /// Fields of the enclosing spans (game, turn_id, phase), innermost last.
    pub span: HashMap<String, Value>,
    /// RFC3339 timestamp
    pub timestamp: String,
}

/// Field storage attached to each span's extensions.
#[derive(Debug, Default, Clone)]
struct SpanFields(HashMap<String, Value>);

/// A tracing layer that sends turn events to a channel.
pub struct TurnEventLayer {
    sender: mpsc::UnboundedSender<TurnEvent>,
}

impl TurnEventLayer {
    pub fn new(sender: mpsc::UnboundedSender<TurnEvent>) -> Self {
        Self { sender }
    }

    /// A layer plus the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TurnEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<S> Layer<S> for TurnEventLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields(fields));
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
                values.record(&mut FieldVisitor(fields));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if !target.starts_with(FORWARDED_TARGET_PREFIX) {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let mut span_fields = HashMap::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(stored)) = span.extensions().get::<SpanFields>() {
                    span_fields.extend(stored.clone());
                }
            }
        }

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        // Non-blocking send; a dropped receiver just means nobody is listening.
        let _ = self.sender.send(TurnEvent {
            target: target.to_string(),
            level: event.metadata().level().to_string(),
            message,
            fields,
            span: span_fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

/// Field visitor that extracts tracing fields into a map.
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), serde_json::json!(format!("{:?}", value)));
    }
}

/// Installs the global subscriber: an `EnvFilter` (from `RUST_LOG`, else
/// `default_filter`) over a stderr fmt layer, plain or JSON, plus an optional
/// event layer.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(default_filter: &str, json: bool, events: Option<TurnEventLayer>) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(events)
        .try_init()
        .is_ok()
}

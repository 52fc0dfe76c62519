use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets never shipped: HTTP internals, and the shipper itself so a failing
/// backend cannot feed its own errors back into the queue
const SKIPPED_TARGETS: [&str; 5] = ["hyper", "h2", "reqwest", "rustls", "crawl_indexer::logging"];

/// One log event as stored in the log index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogDocument {
    pub host: String,
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    /// Upper case, e.g. `WARN`
    pub level: String,
    pub target: String,
    pub message: String,
    /// Event fields, plus the fields of every enclosing span
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

/// Forwards log events to the shipper task
///
/// Events are queued without blocking; when the queue is full or the shipper has
/// stopped they are dropped.
#[derive(Debug, Clone)]
pub struct ElasticLogLayer {
    tx: mpsc::Sender<LogDocument>,
    host: String,
    level: Level,
}

impl ElasticLogLayer {
    /// # Arguments
    ///
    /// * `tx` - Queue read by the shipper
    /// * `host` - Recorded on every event
    /// * `level` - Most verbose level forwarded
    pub fn new(tx: mpsc::Sender<LogDocument>, host: impl Into<String>, level: Level) -> Self {
        Self {
            tx,
            host: host.into(),
            level,
        }
    }

    fn forwards(&self, level: &Level, target: &str) -> bool {
        // More verbose levels compare greater
        *level <= self.level && !SKIPPED_TARGETS.iter().any(|skipped| is_within(target, skipped))
    }
}

/// True when `target` is `module` or one of its submodules
fn is_within(target: &str, module: &str) -> bool {
    match target.strip_prefix(module) {
        Some(rest) => rest.is_empty() || rest.starts_with("::"),
        None => false,
    }
}

/// Fields recorded on a span, kept in its extensions
struct SpanFields(Map<String, Value>);

impl<S> Layer<S> for ElasticLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.data));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        if let Some(fields) = span.extensions_mut().get_mut::<SpanFields>() {
            fields.0.extend(visitor.data);
        };
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !self.forwards(metadata.level(), metadata.target()) {
            return;
        }

        let mut data = Map::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    data.extend(fields.0.clone());
                }
            }
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        data.extend(visitor.data);

        let document = LogDocument {
            host: self.host.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            level: metadata.level().as_str().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            data,
        };

        let _ = self.tx.try_send(document);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    data: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.data.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::from(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::from(format!("{:?}", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    fn collect(level: Level, capacity: usize, emit: impl FnOnce()) -> Vec<LogDocument> {
        let (tx, mut rx) = mpsc::channel(capacity);
        let subscriber =
            tracing_subscriber::registry().with(ElasticLogLayer::new(tx, "test-host", level));
        tracing::subscriber::with_default(subscriber, emit);

        let mut documents = Vec::new();
        while let Ok(document) = rx.try_recv() {
            documents.push(document);
        }
        documents
    }

    #[test]
    fn test_event_becomes_document() {
        let documents = collect(Level::INFO, 16, || {
            tracing::warn!(url = "https://example.com/", status = 404u64, "Fetch failed");
        });

        assert_eq!(documents.len(), 1);
        let document = &documents[0];
        assert_eq!(document.host, "test-host");
        assert_eq!(document.level, "WARN");
        assert_eq!(document.message, "Fetch failed");
        assert_eq!(document.data["url"], "https://example.com/");
        assert_eq!(document.data["status"], 404);
        assert!(chrono::DateTime::parse_from_rfc3339(&document.timestamp).is_ok());
    }

    #[test]
    fn test_span_fields_are_attached() {
        let documents = collect(Level::INFO, 16, || {
            let span = tracing::info_span!("crawl", run = "ab12cd34");
            let _guard = span.enter();
            tracing::info!("Starting crawl");
        });

        assert_eq!(documents[0].data["run"], "ab12cd34");
    }

    #[test]
    fn test_more_verbose_levels_are_skipped() {
        let documents = collect(Level::INFO, 16, || {
            tracing::debug!("noise");
            tracing::info!("kept");
            tracing::error!("kept too");
        });

        let messages: Vec<&str> = documents.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec!["kept", "kept too"]);
    }

    #[test]
    fn test_http_internals_and_own_target_are_skipped() {
        let documents = collect(Level::TRACE, 16, || {
            tracing::info!(target: "hyper::proto", "internal");
            tracing::info!(target: "crawl_indexer::logging::shipper", "shipping failed");
            tracing::info!(target: "hyperlocal", "not an http internal");
        });

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].target, "hyperlocal");
    }

    #[test]
    fn test_full_queue_drops_events() {
        let documents = collect(Level::INFO, 1, || {
            tracing::info!("first");
            tracing::info!("second");
        });

        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].message, "first");
    }

    #[test]
    fn test_document_serialization() {
        let document = LogDocument {
            host: "h".to_string(),
            timestamp: "2024-01-01T00:00:00.000000000Z".to_string(),
            level: "INFO".to_string(),
            target: "crawl_indexer".to_string(),
            message: "hello".to_string(),
            data: Map::new(),
        };

        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(json["@timestamp"], "2024-01-01T00:00:00.000000000Z");
        assert!(json.get("data").is_none());
    }
}

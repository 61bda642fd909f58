//! JSONL file layer.
//!
//! One object per event: timestamp, level, service, pid, target, message and
//! the event's own fields. Field values pass through [`redact_value`] as they
//! are recorded, so a secret never reaches the serializer.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::redact::redact_value;

/// A single line of the log file.
#[derive(Debug, Serialize)]
pub struct LogLine<'a> {
    pub timestamp: String,
    pub level: &'a str,
    pub service: &'a str,
    pub pid: u32,
    pub target: &'a str,
    pub message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<&'static str, Value>,
}

#[derive(Default)]
struct Fields {
    message: String,
    values: BTreeMap<&'static str, Value>,
}

impl Fields {
    fn insert(&mut self, field: &Field, value: Value) {
        let name = field.name();
        if name == "message" {
            self.message = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
        } else {
            self.values.insert(name, redact_value(name, &value));
        }
    }
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Writes every event as one redacted JSON line.
pub struct JsonLayer<W> {
    service: String,
    pid: u32,
    make_writer: W,
}

impl<W> JsonLayer<W> {
    pub fn new(service: String, make_writer: W) -> Self {
        Self {
            service,
            pid: std::process::id(),
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for JsonLayer<W>
where
    S: Subscriber,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);

        let metadata = event.metadata();
        let line = LogLine {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            level: metadata.level().as_str(),
            service: &self.service,
            pid: self.pid,
            target: metadata.target(),
            message: fields.message,
            fields: fields.values,
        };

        if let Ok(json) = serde_json::to_string(&line) {
            let mut writer = self.make_writer.make_writer();
            let _ = writeln!(writer, "{}", json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    #[derive(Clone, Default)]
    struct BufferWriter {
        buf: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for BufferWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.buf.lock().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = BufferWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture(emit: impl FnOnce()) -> Vec<Value> {
        let writer = BufferWriter::default();
        let subscriber = tracing_subscriber::registry()
            .with(JsonLayer::new("keeper".to_string(), writer.clone()));
        tracing::subscriber::with_default(subscriber, emit);

        let output = String::from_utf8(writer.buf.lock().clone()).unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_line_shape() {
        let lines = capture(|| tracing::warn!("renewal round settled"));

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["service"], "keeper");
        assert_eq!(line["pid"], std::process::id());
        assert_eq!(line["message"], "renewal round settled");
        assert!(line.get("fields").is_none());
    }

    #[test]
    fn test_layer_redacts_token_fields() {
        let lines = capture(|| {
            tracing::info!(access_token = "secret-value", role = "admin", waiters = 3u64, "signed in");
        });

        let line = &lines[0];
        assert_eq!(line["message"], "signed in");
        assert_eq!(line["fields"]["role"], "admin");
        assert_eq!(line["fields"]["waiters"], 3);
        assert_eq!(line["fields"]["access_token"], crate::REDACTED);
    }

    #[test]
    fn test_bearer_value_redacted_under_plain_key() {
        let lines = capture(|| tracing::debug!(header = "Bearer abc.def", "outgoing request"));
        assert_eq!(lines[0]["fields"]["header"], crate::REDACTED);
    }
}

//! Line-oriented log capture.
//!
//! A session emits its progress through `tracing`. Callers that want the
//! plain `HH:MM:SS | LEVEL message` line stream (a test harness log file, a
//! channel, an in-memory buffer) build a [`Dispatch`] with [`line_dispatch`]
//! and hand it to [`crate::TempDb::with_dispatch`].

use std::fmt::Write as FmtWrite;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// Destination for formatted log lines. Writes are fire-and-forget.
pub trait LogSink: Send + Sync + 'static {
    fn write_line(&self, line: String);
}

impl LogSink for mpsc::UnboundedSender<String> {
    fn write_line(&self, line: String) {
        let _ = self.send(line);
    }
}

impl LogSink for mpsc::Sender<String> {
    fn write_line(&self, line: String) {
        // Non-blocking; a full channel drops the line.
        let _ = self.try_send(line);
    }
}

impl LogSink for Arc<Mutex<Vec<String>>> {
    fn write_line(&self, line: String) {
        if let Ok(mut lines) = self.lock() {
            lines.push(line);
        }
    }
}

/// A tracing layer that formats events as single lines and forwards them to
/// a [`LogSink`].
pub struct LogLineLayer<K> {
    sink: K,
}

impl<K: LogSink> LogLineLayer<K> {
    pub fn new(sink: K) -> Self {
        Self { sink }
    }
}

impl<S, K> Layer<S> for LogLineLayer<K>
where
    S: Subscriber,
    K: LogSink,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut line = String::new();

        let now = chrono::Local::now();
        let _ = write!(line, "{} | {:5} ", now.format("%H:%M:%S"), event.metadata().level());

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        line.push_str(&visitor.finish());

        self.sink.write_line(line);
    }
}

/// Build a dispatcher that writes every event at `level` or above to `sink`.
pub fn line_dispatch<K: LogSink>(sink: K, level: LevelFilter) -> Dispatch {
    let subscriber = tracing_subscriber::registry()
        .with(LogLineLayer::new(sink).with_filter(level));
    Dispatch::new(subscriber)
}

/// Visitor for extracting the message and trailing fields from an event.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        let _ = write!(self.fields, " {}={}", name, value);
    }

    fn finish(self) -> String {
        let mut line = self.message;
        if line.is_empty() {
            line.push_str(self.fields.trim_start());
        } else {
            line.push_str(&self.fields);
        }
        line
    }
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            self.push_field(field.name(), &format_args!("{:?}", value));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.push_field(field.name(), &value);
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.push_field(field.name(), &value);
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.push_field(field.name(), &value);
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.push_field(field.name(), &value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_are_captured_in_buffer() {
        let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let dispatch = line_dispatch(lines.clone(), LevelFilter::INFO);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("Copying table {}", "[dbo].[Orders]");
            tracing::debug!("filtered out");
            tracing::warn!(rows = 3u64, "Partial copy");
        });

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("| INFO  Copying table [dbo].[Orders]"));
        assert!(lines[1].contains("WARN"));
        assert!(lines[1].ends_with("Partial copy rows=3"));
    }

    #[tokio::test]
    async fn test_lines_are_sent_to_channel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatch = line_dispatch(tx, LevelFilter::DEBUG);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("Executing statement");
        });

        let line = rx.recv().await.unwrap();
        assert!(line.contains("DEBUG"));
        assert!(line.ends_with("Executing statement"));
    }
}

//! Capturing logger factory.
//!
//! Tests need to assert on what was logged, in particular the lifecycle
//! manager's swallowed-error events, so the factory returns a tracing
//! dispatcher whose only output is an in-memory buffer.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;

/// One captured log event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Event level.
    pub level: Level,
    /// Emitting module path.
    pub target: String,
    /// Rendered message plus any structured fields.
    pub message: String,
}

/// Shared buffer of captured log events; the "handler" half of the
/// logger factory pair.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogBuffer {
    /// Snapshot of all captured records, in emission order.
    #[must_use]
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Returns true if any captured message contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.records
            .lock()
            .map(|r| r.iter().any(|rec| rec.message.contains(needle)))
            .unwrap_or(false)
    }

    /// Discards all captured records.
    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }

    /// Number of captured records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, record: LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

struct CaptureLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.buffer.push(LogRecord {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.rendered,
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    rendered: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if !self.rendered.is_empty() {
            self.rendered.push(' ');
        }
        if field.name() == "message" {
            self.rendered.push_str(&format!("{value:?}"));
        } else {
            self.rendered.push_str(&format!("{}={:?}", field.name(), value));
        }
    }
}

/// Builds a capturing logger: the dispatcher to install and the buffer
/// the installed dispatcher feeds.
#[must_use]
pub fn capture_dispatch() -> (Dispatch, LogBuffer) {
    let buffer = LogBuffer::default();
    let subscriber = Registry::default().with(CaptureLayer {
        buffer: buffer.clone(),
    });
    (Dispatch::new(subscriber), buffer)
}

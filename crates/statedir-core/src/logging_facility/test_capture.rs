//! In-memory event capture for logging assertions
//!
//! Tests share one global subscriber and run in parallel, so every query
//! here is scoped to an operation name and a target path. Each test stages
//! into its own temporary directory, which keeps the scopes disjoint.

use statedir_core_types::schema::{FIELD_EVENT, FIELD_OP, FIELD_TARGET_PATH, TERMINAL_EVENTS};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// One recorded event, with every field rendered to a string
#[derive(Clone, Debug)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn op(&self) -> Option<&str> {
        self.field(FIELD_OP)
    }

    /// Boundary name (`start`, `end`, `end_error`, `abort`)
    pub fn event(&self) -> Option<&str> {
        self.field(FIELD_EVENT)
    }

    fn matches(&self, op: &str, target: &str) -> bool {
        self.op() == Some(op) && self.field(FIELD_TARGET_PATH) == Some(target)
    }
}

struct Fields<'a>(&'a mut HashMap<String, String>);

impl Visit for Fields<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

struct CaptureLayer {
    sink: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut Fields(&mut fields));
        let captured = CapturedEvent {
            level: *event.metadata().level(),
            fields,
        };
        if let Ok(mut sink) = self.sink.lock() {
            sink.push(captured);
        }
    }
}

/// Handle on the global capture buffer
#[derive(Clone)]
pub struct TestCapture {
    sink: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl TestCapture {
    /// Every event recorded so far, across all tests
    pub fn snapshot(&self) -> Vec<CapturedEvent> {
        self.sink
            .lock()
            .map(|sink| sink.clone())
            .unwrap_or_default()
    }

    /// Events of operation `op` that carry `target` as their target path
    pub fn for_target(&self, op: &str, target: impl AsRef<Path>) -> Vec<CapturedEvent> {
        let target = target.as_ref().display().to_string();
        self.snapshot()
            .into_iter()
            .filter(|e| e.matches(op, &target))
            .collect()
    }

    /// The boundary events `op` emitted for `target`, in order
    pub fn lifecycle(&self, op: &str, target: impl AsRef<Path>) -> Vec<String> {
        self.for_target(op, target)
            .iter()
            .filter_map(|e| e.event().map(str::to_string))
            .collect()
    }

    /// The last boundary `op` emitted for `target` closes the operation
    pub fn is_closed(&self, op: &str, target: impl AsRef<Path>) -> bool {
        self.lifecycle(op, target)
            .last()
            .is_some_and(|event| TERMINAL_EVENTS.contains(&event.as_str()))
    }

    /// The first `event` boundary `op` emitted for `target`
    pub fn find(&self, op: &str, target: impl AsRef<Path>, event: &str) -> Option<CapturedEvent> {
        self.for_target(op, target)
            .into_iter()
            .find(|e| e.event() == Some(event))
    }

    /// Events of operation `op` regardless of target
    pub fn for_op(&self, op: &str) -> Vec<CapturedEvent> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.op() == Some(op))
            .collect()
    }
}

static CAPTURE: OnceLock<TestCapture> = OnceLock::new();

/// Install the capture layer as the global subscriber
///
/// Only the first call installs anything; every call returns a handle to the
/// same buffer.
///
/// ```
/// use statedir_core::log_op_start;
/// use statedir_core::logging_facility::test_capture::init_test_capture;
///
/// let capture = init_test_capture();
/// log_op_start!("doc_purge", target_path = "/srv/doc");
/// assert_eq!(capture.lifecycle("doc_purge", "/srv/doc"), vec!["start"]);
/// ```
pub fn init_test_capture() -> TestCapture {
    CAPTURE
        .get_or_init(|| {
            let sink = Arc::new(Mutex::new(Vec::new()));
            let layer = CaptureLayer {
                sink: Arc::clone(&sink),
            };
            // A subscriber installed elsewhere wins; capture then stays empty
            let _ = tracing_subscriber::registry().with(layer).try_init();
            TestCapture { sink }
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(op: &str, target: &str, boundary: &str) -> CapturedEvent {
        let fields = [
            (FIELD_OP, op),
            (FIELD_TARGET_PATH, target),
            (FIELD_EVENT, boundary),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        CapturedEvent {
            level: Level::INFO,
            fields,
        }
    }

    #[test]
    fn test_scoping_by_op_and_target() {
        let capture = TestCapture {
            sink: Arc::new(Mutex::new(vec![
                event("stage_dir", "/a", "start"),
                event("stage_dir", "/b", "start"),
                event("stage_file", "/a", "start"),
                event("stage_dir", "/a", "end"),
            ])),
        };

        assert_eq!(capture.lifecycle("stage_dir", "/a"), vec!["start", "end"]);
        assert_eq!(capture.for_op("stage_dir").len(), 3);
        assert!(capture.find("stage_file", "/a", "end").is_none());
        assert!(capture.is_closed("stage_dir", "/a"));
        assert!(!capture.is_closed("stage_dir", "/b"));
    }
}

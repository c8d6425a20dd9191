pub mod memory;
pub mod statsd;

pub use memory::{HistogramSummary, InMemoryMetrics, MetricsSnapshot, TimingSummary};
pub use statsd::StatsdMetrics;

use std::sync::Arc;
use std::time::{Duration, Instant};

pub const QUEUE_MESSAGE_RECEIVED: &str = "queue.message_received";
pub const QUEUE_ERROR: &str = "queue.error";
pub const QUEUE_RECEIVE_MESSAGE_TIME: &str = "queue.receive_message.time";
pub const QUEUE_BATCH_SIZE: &str = "queue.receive_message.batch_size";
pub const QUEUE_ACK_TRIED: &str = "queue.ack.tried";
pub const QUEUE_ACK_OK: &str = "queue.ack.ok";
pub const QUEUE_ACK_ERR: &str = "queue.ack.error";
pub const QUEUE_ACK_TIME: &str = "queue.ack.time";

/// Counter/timer backend. Tags are `key:value` strings.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str, tags: &[String]);

    fn timing(&self, name: &str, elapsed: Duration, tags: &[String]);

    fn gauge(&self, name: &str, value: f64, tags: &[String]);

    fn histogram(&self, name: &str, value: f64, tags: &[String]);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn incr(&self, _name: &str, _tags: &[String]) {}

    fn timing(&self, _name: &str, _elapsed: Duration, _tags: &[String]) {}

    fn gauge(&self, _name: &str, _value: f64, _tags: &[String]) {}

    fn histogram(&self, _name: &str, _value: f64, _tags: &[String]) {}
}

/// Forwards every data point to each of its sinks.
#[derive(Default)]
pub struct FanoutMetrics {
    sinks: Vec<Arc<dyn MetricsSink>>,
}

impl FanoutMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl MetricsSink for FanoutMetrics {
    fn incr(&self, name: &str, tags: &[String]) {
        for sink in &self.sinks {
            sink.incr(name, tags);
        }
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &[String]) {
        for sink in &self.sinks {
            sink.timing(name, elapsed, tags);
        }
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        for sink in &self.sinks {
            sink.gauge(name, value, tags);
        }
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        for sink in &self.sinks {
            sink.histogram(name, value, tags);
        }
    }
}

/// Cheap to clone handle over a sink, carrying default tags.
#[derive(Clone)]
pub struct Metrics {
    sink: Arc<dyn MetricsSink>,
    tags: Vec<String>,
}

impl Metrics {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            sink,
            tags: Vec::new(),
        }
    }

    pub fn null() -> Self {
        Self::new(Arc::new(NullMetrics))
    }

    pub fn with_tags<I, T>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut tagged = self.clone();
        tagged.tags.extend(tags.into_iter().map(Into::into));
        tagged
    }

    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        self.with_tags([tag])
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn incr(&self, name: &str) {
        self.sink.incr(name, &self.tags);
    }

    /// Records the time elapsed since `start`.
    pub fn timing(&self, name: &str, start: Instant) {
        self.sink.timing(name, start.elapsed(), &self.tags);
    }

    pub fn gauge(&self, name: &str, value: f64) {
        self.sink.gauge(name, value, &self.tags);
    }

    pub fn histogram(&self, name: &str, value: f64) {
        self.sink.histogram(name, value, &self.tags);
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").field("tags", &self.tags).finish()
    }
}

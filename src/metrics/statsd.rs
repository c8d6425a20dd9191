use anyhow::{Context, Result};
use cadence::prelude::*;
use cadence::{Metric, MetricBuilder, MetricError, QueuingMetricSink, StatsdClient, UdpMetricSink};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{info, warn};

use super::MetricsSink;

/// Ships data points to a statsd agent over UDP, tags in Datadog format.
///
/// Sends go through a background queue, so recording never blocks on the
/// socket. Failed sends are logged and dropped.
pub struct StatsdMetrics {
    client: StatsdClient,
}

impl StatsdMetrics {
    pub fn new<A: ToSocketAddrs + std::fmt::Debug>(addr: A, prefix: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").context("Failed to bind statsd socket")?;
        socket.set_nonblocking(true)?;

        info!("Sending metrics to statsd at {:?} with prefix {}", addr, prefix);
        let udp = UdpMetricSink::from(addr, socket).context("Invalid statsd address")?;
        let client = StatsdClient::builder(prefix, QueuingMetricSink::from(udp))
            .with_error_handler(|e: MetricError| warn!("Failed to send metric: {}", e))
            .build();

        Ok(Self { client })
    }
}

/// `key:value` tags become Datadog key/value tags, anything else a bare tag.
fn send_tagged<'m, 'c, T>(mut builder: MetricBuilder<'m, 'c, T>, tags: &'m [String])
where
    T: Metric + From<String>,
{
    for tag in tags {
        builder = match tag.split_once(':') {
            Some((key, value)) => builder.with_tag(key, value),
            None => builder.with_tag_value(tag),
        };
    }
    builder.send();
}

impl MetricsSink for StatsdMetrics {
    fn incr(&self, name: &str, tags: &[String]) {
        send_tagged(self.client.incr_with_tags(name), tags);
    }

    fn timing(&self, name: &str, elapsed: Duration, tags: &[String]) {
        send_tagged(
            self.client.time_with_tags(name, elapsed.as_millis() as u64),
            tags,
        );
    }

    fn gauge(&self, name: &str, value: f64, tags: &[String]) {
        send_tagged(self.client.gauge_with_tags(name, value), tags);
    }

    fn histogram(&self, name: &str, value: f64, tags: &[String]) {
        send_tagged(self.client.histogram_with_tags(name, value), tags);
    }
}

impl std::fmt::Debug for StatsdMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsdMetrics").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> UdpSocket {
        let agent = UdpSocket::bind("127.0.0.1:0").unwrap();
        agent.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        agent
    }

    fn next_line(agent: &UdpSocket) -> String {
        let mut buf = [0u8; 1024];
        let n = agent.recv(&mut buf).unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[test]
    fn test_counter_carries_prefix_and_tags() {
        let agent = agent();
        let metrics = StatsdMetrics::new(agent.local_addr().unwrap(), "drainpipe").unwrap();

        metrics.incr(
            "queue.ack.ok",
            &["queue:https://sqs.local/jobs".to_string(), "canary".to_string()],
        );

        let line = next_line(&agent);
        assert!(line.starts_with("drainpipe.queue.ack.ok:1|c"), "{}", line);
        assert!(line.contains("queue:https://sqs.local/jobs"), "{}", line);
        assert!(line.contains("canary"), "{}", line);
    }

    #[test]
    fn test_timing_is_sent_in_milliseconds() {
        let agent = agent();
        let metrics = StatsdMetrics::new(agent.local_addr().unwrap(), "drainpipe").unwrap();

        metrics.timing("queue.ack.time", Duration::from_millis(42), &[]);

        assert_eq!(next_line(&agent), "drainpipe.queue.ack.time:42|ms");
    }

    #[test]
    fn test_histogram() {
        let agent = agent();
        let metrics = StatsdMetrics::new(agent.local_addr().unwrap(), "drainpipe").unwrap();

        metrics.histogram("queue.receive_message.batch_size", 3.0, &[]);

        assert!(next_line(&agent).starts_with("drainpipe.queue.receive_message.batch_size:3|h"));
    }
}

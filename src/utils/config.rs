use anyhow::{bail, Context, Result};
use core::fmt;
use duration_string::DurationString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::queue::ListenerSettings;

/// Longest long-poll SQS accepts.
const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Sqs,
    Mock,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub source: SourceKind,
    pub queue_url: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub fixtures: Option<PathBuf>,
    pub fixture_interval: DurationString,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    pub max_messages: i32,
    pub wait_time: DurationString,
    pub empty_backoff: DurationString,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Oldest successful poll `/health` still reports as healthy.
    pub max_staleness: DurationString,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    /// `host:port` of a statsd agent. Metrics stay in-process when unset.
    pub statsd_addr: Option<String>,
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            statsd_addr: None,
            prefix: "drainpipe".to_string(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Sqs,
            queue_url: None,
            region: None,
            endpoint_url: None,
            fixtures: None,
            fixture_interval: DurationString::from(Duration::from_millis(100)),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: DurationString::from(MAX_WAIT_TIME),
            empty_backoff: DurationString::from(Duration::from_secs(1)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_staleness: DurationString::from(Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.queue.source {
            SourceKind::Sqs => write!(
                f,
                "Configured to listen on {}",
                self.queue.queue_url.as_deref().unwrap_or("<unset>")
            ),
            SourceKind::Mock => write!(
                f,
                "Configured to replay {}",
                self.queue
                    .fixtures
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<unset>".to_string())
            ),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Overrides file values with `QUEUE_URL`, `AWS_REGION`, `AWS_ENDPOINT_URL`,
    /// `QUEUE_FIXTURES` and `STATSD_ADDR` when set.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("QUEUE_URL") {
            self.queue.queue_url = Some(url);
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.queue.region = Some(region);
        }
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            self.queue.endpoint_url = Some(endpoint);
        }
        if let Ok(fixtures) = std::env::var("QUEUE_FIXTURES") {
            self.queue.fixtures = Some(PathBuf::from(fixtures));
            self.queue.source = SourceKind::Mock;
        }
        if let Ok(addr) = std::env::var("STATSD_ADDR") {
            self.metrics.statsd_addr = Some(addr);
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.queue.source {
            SourceKind::Sqs => {
                let queue_url = self
                    .queue
                    .queue_url
                    .as_deref()
                    .context("queue_url must be set for the sqs source")?;
                url::Url::parse(queue_url)
                    .with_context(|| format!("Invalid queue_url: {}", queue_url))?;
            }
            SourceKind::Mock => {
                if self.queue.fixtures.is_none() {
                    bail!("fixtures must be set for the mock source");
                }
            }
        }

        if !(1..=10).contains(&self.listener.max_messages) {
            bail!(
                "max_messages must be between 1 and 10, got {}",
                self.listener.max_messages
            );
        }

        let wait_time: Duration = self.listener.wait_time.clone().into();
        if wait_time > MAX_WAIT_TIME {
            bail!("wait_time must be at most {:?}, got {:?}", MAX_WAIT_TIME, wait_time);
        }

        if let Some(addr) = &self.metrics.statsd_addr {
            if !addr.contains(':') {
                bail!("statsd_addr must be host:port, got {}", addr);
            }
        }

        Ok(())
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings {
            max_messages: self.listener.max_messages,
            wait_time: self.listener.wait_time.clone().into(),
            empty_backoff: self.listener.empty_backoff.clone().into(),
        }
    }

    pub fn fixture_interval(&self) -> Duration {
        self.queue.fixture_interval.clone().into()
    }

    pub fn max_staleness(&self) -> Duration {
        self.server.max_staleness.clone().into()
    }
}

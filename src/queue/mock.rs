use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, Instrument, Span};

use super::error::ListenerError;
use super::health::HealthTracker;
use super::listener::{shutdown_requested, Listener, ListenerStreams, CHANNEL_CAPACITY};
use super::message::{Acknowledgement, Message};
use super::source::QueueMessage;

pub const DEFAULT_FIXTURE_INTERVAL: Duration = Duration::from_millis(100);

/// Offline listener replaying a JSON array of fixtures.
///
/// Each fixture is emitted `interval` apart. Once they are exhausted the
/// listener pushes [`ListenerError::FixturesExhausted`], waits one more
/// interval and closes the message stream. Acknowledgements are logged and
/// recorded, never deleted anywhere. Logging goes through the `logger` span.
pub struct MockListener {
    path: PathBuf,
    fixtures: Vec<QueueMessage>,
    interval: Duration,
    logger: Span,
    health: Arc<HealthTracker>,
    acknowledged: Arc<Mutex<Vec<Acknowledgement>>>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl MockListener {
    /// Loads the fixture file. A missing or malformed file is an error.
    pub fn new(path: impl AsRef<Path>, logger: Span) -> Result<Self, ListenerError> {
        let path = path.as_ref().to_path_buf();

        let data = std::fs::read_to_string(&path).map_err(|source| ListenerError::FixtureRead {
            path: path.clone(),
            source,
        })?;
        let fixtures: Vec<QueueMessage> =
            serde_json::from_str(&data).map_err(|source| ListenerError::FixtureFormat {
                path: path.clone(),
                source,
            })?;

        logger.in_scope(|| info!("Loaded {} fixtures from {}", fixtures.len(), path.display()));
        Ok(Self::from_fixtures(path, fixtures, logger))
    }

    pub fn from_fixtures(
        path: impl Into<PathBuf>,
        fixtures: Vec<QueueMessage>,
        logger: Span,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            path: path.into(),
            fixtures,
            interval: DEFAULT_FIXTURE_INTERVAL,
            logger,
            health: Arc::new(HealthTracker::new()),
            acknowledged: Arc::new(Mutex::new(Vec::new())),
            started: AtomicBool::new(false),
            shutdown,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn fixtures(&self) -> &[QueueMessage] {
        &self.fixtures
    }

    /// Acknowledgements received so far, in arrival order.
    pub fn acknowledged(&self) -> Vec<Acknowledgement> {
        self.acknowledged
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Listener for MockListener {
    fn listen(&self) -> Result<ListenerStreams, ListenerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyListening);
        }

        let (message_tx, message_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (ack_tx, mut ack_rx) = mpsc::channel::<Acknowledgement>(CHANNEL_CAPACITY);

        let span = info_span!(
            parent: &self.logger,
            "mock_listener",
            fixtures = %self.path.display(),
        );

        let fixtures = self.fixtures.clone();
        let interval = self.interval;
        let health = self.health.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(
            async move {
                for fixture in fixtures {
                    health.record_success();
                    let message = Message::new(fixture, ack_tx.clone());
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => return,
                        sent = message_tx.send(message) => if sent.is_err() { return },
                    }
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => return,
                        _ = tokio::time::sleep(interval) => {}
                    }
                }

                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => return,
                    _ = error_tx.send(ListenerError::FixturesExhausted) => {}
                }

                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                debug!("Fixtures exhausted, closing message stream");
            }
            .instrument(span.clone()),
        );

        let acknowledged = self.acknowledged.clone();
        tokio::spawn(
            async move {
                while let Some(ack) = ack_rx.recv().await {
                    debug!(receipt_handle = %ack.receipt_token, "Mock listener: ack message");
                    acknowledged
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(ack);
                }
            }
            .instrument(span),
        );

        Ok(ListenerStreams {
            messages: message_rx,
            errors: error_rx,
        })
    }

    fn health_check(&self) -> Option<Duration> {
        self.health.elapsed_since_last_success()
    }

    fn shutdown(&self) {
        self.logger.in_scope(|| info!("Shutting down mock listener"));
        self.shutdown.send_replace(true);
    }
}

impl std::fmt::Debug for MockListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockListener")
            .field("path", &self.path)
            .field("fixtures", &self.fixtures.len())
            .field("interval", &self.interval)
            .finish()
    }
}

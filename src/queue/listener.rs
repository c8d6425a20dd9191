use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument, Span};
use uuid::Uuid;

use crate::metrics::{
    Metrics, QUEUE_ACK_ERR, QUEUE_ACK_OK, QUEUE_ACK_TIME, QUEUE_ACK_TRIED, QUEUE_BATCH_SIZE,
    QUEUE_ERROR, QUEUE_MESSAGE_RECEIVED, QUEUE_RECEIVE_MESSAGE_TIME,
};

use super::error::ListenerError;
use super::health::HealthTracker;
use super::message::{Acknowledgement, Message};
use super::source::QueueSource;
use super::sqs::SqsQueue;

/// Capacity of the message, error and acknowledgement channels.
pub(crate) const CHANNEL_CAPACITY: usize = 1;

/// Receiving ends handed to the consumer by [`Listener::listen`].
///
/// Both streams must be drained. The receive loop blocks on whichever one is
/// full, so a consumer that only reads messages stalls the listener on the
/// first receive error, and vice versa.
#[derive(Debug)]
pub struct ListenerStreams {
    pub messages: mpsc::Receiver<Message>,
    pub errors: mpsc::Receiver<ListenerError>,
}

/// Streams messages from a queue and accepts acknowledgements for them.
pub trait Listener: Send + Sync {
    /// Starts the listener's background tasks and returns its streams. Can only
    /// be called once per instance; must be called from within a tokio runtime.
    fn listen(&self) -> Result<ListenerStreams, ListenerError>;

    /// Time since the last successful poll, `None` if there was none yet.
    fn health_check(&self) -> Option<Duration>;

    /// Stops polling. Messages already handed out, including one still
    /// buffered in the message stream, can be acknowledged until they are
    /// acked or dropped.
    fn shutdown(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerSettings {
    pub max_messages: i32,
    pub wait_time: Duration,
    pub empty_backoff: Duration,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            max_messages: 10,
            wait_time: Duration::from_secs(20),
            empty_backoff: Duration::from_secs(1),
        }
    }
}

/// Listener backed by a remote [`QueueSource`].
///
/// Every span and event the listener emits is parented on the `logger` span
/// given at construction.
pub struct QueueListener {
    id: Uuid,
    queue_url: String,
    source: Arc<dyn QueueSource>,
    settings: ListenerSettings,
    logger: Span,
    health: Arc<HealthTracker>,
    metrics: Metrics,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
struct LoopContext {
    source: Arc<dyn QueueSource>,
    settings: ListenerSettings,
    health: Arc<HealthTracker>,
    metrics: Metrics,
}

impl QueueListener {
    pub fn new(
        source: Arc<dyn QueueSource>,
        queue_url: impl Into<String>,
        settings: ListenerSettings,
        logger: Span,
        metrics: Metrics,
    ) -> Self {
        let queue_url = queue_url.into();
        let (shutdown, _) = watch::channel(false);

        Self {
            id: Uuid::new_v4(),
            metrics: metrics.with_tag(format!("queue:{}", queue_url)),
            queue_url,
            source,
            settings,
            logger,
            health: Arc::new(HealthTracker::new()),
            started: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Builds an SQS-backed listener. Fails if no AWS session can be set up.
    #[instrument(parent = &logger, skip(settings, logger, metrics))]
    pub async fn connect(
        queue_url: &str,
        region: Option<&str>,
        endpoint_url: Option<&str>,
        settings: ListenerSettings,
        logger: Span,
        metrics: Metrics,
    ) -> Result<Self, ListenerError> {
        let source = SqsQueue::connect(queue_url, region, endpoint_url)
            .await
            .map_err(ListenerError::Connect)?;

        info!("Connected to queue {}", queue_url);
        Ok(Self::new(Arc::new(source), queue_url, settings, logger, metrics))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    pub fn health(&self) -> Arc<HealthTracker> {
        self.health.clone()
    }

    pub fn logger(&self) -> &Span {
        &self.logger
    }

    fn context(&self) -> LoopContext {
        LoopContext {
            source: self.source.clone(),
            settings: self.settings.clone(),
            health: self.health.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl Listener for QueueListener {
    fn listen(&self) -> Result<ListenerStreams, ListenerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyListening);
        }

        let (message_tx, message_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (ack_tx, ack_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let span = info_span!(
            parent: &self.logger,
            "queue_listener",
            listener.id = %self.id,
            queue.url = %self.queue_url,
        );

        tokio::spawn(
            receive_loop(
                self.context(),
                message_tx,
                error_tx,
                ack_tx,
                self.shutdown.subscribe(),
            )
            .instrument(info_span!(parent: &span, "receive_loop")),
        );

        tokio::spawn(
            ack_loop(self.context(), ack_rx).instrument(info_span!(parent: &span, "ack_loop")),
        );

        span.in_scope(|| info!("Listener started"));

        Ok(ListenerStreams {
            messages: message_rx,
            errors: error_rx,
        })
    }

    fn health_check(&self) -> Option<Duration> {
        self.health.elapsed_since_last_success()
    }

    fn shutdown(&self) {
        self.logger
            .in_scope(|| info!(listener.id = %self.id, "Shutting down listener"));
        self.shutdown.send_replace(true);
    }
}

/// Resolves once shutdown was requested. Never resolves if the listener is
/// dropped without calling [`Listener::shutdown`].
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let requested = shutdown.wait_for(|stop| *stop).await.is_ok();
    if !requested {
        std::future::pending::<()>().await;
    }
}

async fn receive_loop(
    ctx: LoopContext,
    messages: mpsc::Sender<Message>,
    errors: mpsc::Sender<ListenerError>,
    acks: mpsc::Sender<Acknowledgement>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Receive loop started");

    loop {
        let start = Instant::now();

        let received = tokio::select! {
            _ = shutdown_requested(&mut shutdown) => break,
            received = ctx.source.receive_batch(ctx.settings.max_messages, ctx.settings.wait_time) => received,
        };
        ctx.metrics.timing(QUEUE_RECEIVE_MESSAGE_TIME, start);

        let batch = match received {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Could not receive messages");
                ctx.metrics.incr(QUEUE_ERROR);

                tokio::select! {
                    _ = shutdown_requested(&mut shutdown) => break,
                    sent = errors.send(ListenerError::Receive(e)) => {
                        if sent.is_err() {
                            warn!("Error stream dropped by consumer");
                            break;
                        }
                    }
                }
                continue;
            }
        };

        // The call itself succeeded, even if the batch is empty.
        ctx.health.record_success();
        ctx.metrics.histogram(QUEUE_BATCH_SIZE, batch.len() as f64);

        let empty = batch.is_empty();
        for raw in batch {
            debug!(message.id = %raw.message_id, body = %raw.body, "Message received");
            ctx.metrics.incr(QUEUE_MESSAGE_RECEIVED);

            let message = Message::new(raw, acks.clone());
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Receive loop stopped");
                    return;
                }
                sent = messages.send(message) => {
                    if sent.is_err() {
                        warn!("Message stream dropped by consumer");
                        info!("Receive loop stopped");
                        return;
                    }
                }
            }
        }

        if empty {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(ctx.settings.empty_backoff) => {}
            }
        }
    }

    info!("Receive loop stopped");
}

/// Not stopped by shutdown. The channel closes once the receive loop has
/// exited and every handed-out message was acked or dropped.
async fn ack_loop(ctx: LoopContext, mut acks: mpsc::Receiver<Acknowledgement>) {
    info!("Ack loop started");

    while let Some(ack) = acks.recv().await {
        delete(&ctx, ack).await;
    }

    info!("Ack loop stopped");
}

async fn delete(ctx: &LoopContext, ack: Acknowledgement) {
    ctx.metrics.incr(QUEUE_ACK_TRIED);
    let start = Instant::now();

    match ctx.source.delete_by_receipt(&ack.receipt_token).await {
        Ok(()) => {
            debug!(message.id = %ack.message_id, "Message deleted");
            ctx.metrics.incr(QUEUE_ACK_OK);
        }
        Err(e) => {
            // No retry: the message becomes visible again after its visibility
            // timeout and is delivered a second time.
            error!(
                message.id = %ack.message_id,
                receipt_handle = %ack.receipt_token,
                error = %format!("{:#}", e),
                "Could not delete message"
            );
            ctx.metrics.incr(QUEUE_ACK_ERR);
        }
    }

    ctx.metrics.timing(QUEUE_ACK_TIME, start);
}

impl std::fmt::Debug for QueueListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueListener")
            .field("id", &self.id)
            .field("queue_url", &self.queue_url)
            .field("settings", &self.settings)
            .finish()
    }
}

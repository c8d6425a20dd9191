use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::queue::{Delivery, ListenerStreams};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Result<()>;
}

/// Logs every delivery and accepts it.
pub struct LogHandler;

#[async_trait]
impl MessageHandler for LogHandler {
    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        info!(message.id = %delivery.id, body = %delivery.body, "Message processed");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub failed: u64,
    pub errors: u64,
}

/// Drains a listener's streams, acknowledging each message its handler
/// accepts. Messages the handler rejects are left for redelivery.
pub struct Worker<H> {
    handler: H,
}

impl<H: MessageHandler> Worker<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Runs until both streams are closed.
    #[instrument(skip_all)]
    pub async fn run(&self, streams: ListenerStreams) -> WorkerStats {
        let ListenerStreams {
            mut messages,
            mut errors,
        } = streams;
        let mut stats = WorkerStats::default();
        let mut messages_open = true;
        let mut errors_open = true;

        while messages_open || errors_open {
            tokio::select! {
                message = messages.recv(), if messages_open => {
                    let Some(message) = message else {
                        messages_open = false;
                        continue;
                    };

                    let (delivery, ack) = message.into_parts();
                    match self.handler.handle(&delivery).await {
                        Ok(()) => {
                            stats.processed += 1;
                            if let Err(e) = ack.ack().await {
                                warn!(message.id = %delivery.id, error = %e, "Could not acknowledge message");
                            }
                        }
                        Err(e) => {
                            stats.failed += 1;
                            warn!(
                                message.id = %delivery.id,
                                error = %format!("{:#}", e),
                                "Handler failed, message left for redelivery"
                            );
                        }
                    }
                }
                error = errors.recv(), if errors_open => {
                    match error {
                        Some(e) => {
                            stats.errors += 1;
                            warn!(error = %e, "Listener reported an error");
                        }
                        None => errors_open = false,
                    }
                }
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            errors = stats.errors,
            "Worker stopped"
        );
        stats
    }
}

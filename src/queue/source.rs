use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote queue service the listener polls and deletes from.
///
/// Implementations must be safe to call concurrently: the receive loop and the
/// acknowledge loop share one handle.
#[async_trait]
pub trait QueueSource: Send + Sync {
    /// Long-polls for up to `max_messages` records, blocking at most `wait`
    /// before returning an empty batch.
    async fn receive_batch(&self, max_messages: i32, wait: Duration) -> Result<Vec<QueueMessage>>;

    /// Deletes one delivery, identified by its receipt handle.
    async fn delete_by_receipt(&self, receipt_handle: &str) -> Result<()>;
}

/// A record as returned by the queue service, before it is bound to a listener.
///
/// Also the on-disk fixture format of the mock listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub body: String,
    pub receipt_handle: String,
}

impl QueueMessage {
    pub fn new(
        message_id: impl Into<String>,
        body: impl Into<String>,
        receipt_handle: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
            receipt_handle: receipt_handle.into(),
        }
    }
}

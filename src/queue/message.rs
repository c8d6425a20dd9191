use serde::Serialize;
use tokio::sync::mpsc;

use super::error::ListenerError;
use super::source::QueueMessage;

/// The consumer-visible content of a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub id: String,
    pub body: String,
    pub receipt_token: String,
}

/// What travels from a consumer back to the acknowledge loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub message_id: String,
    pub receipt_token: String,
}

/// Single-use capability to acknowledge one delivery.
///
/// `ack` takes the handle by value, so a delivery can be acknowledged at most
/// once. Dropping the handle without acknowledging leaves the message on the
/// queue until its visibility timeout expires and it is redelivered.
#[derive(Debug)]
pub struct AckHandle {
    message_id: String,
    receipt_token: String,
    sender: mpsc::Sender<Acknowledgement>,
}

impl AckHandle {
    pub fn receipt_token(&self) -> &str {
        &self.receipt_token
    }

    /// Hands the acknowledgement to the listener's acknowledge loop.
    ///
    /// Resolves once the loop has accepted it, not once the remote delete has
    /// completed. Delete failures are logged by the listener and never reported
    /// back here.
    pub async fn ack(self) -> Result<(), ListenerError> {
        let ack = Acknowledgement {
            message_id: self.message_id,
            receipt_token: self.receipt_token,
        };
        self.sender.send(ack).await.map_err(|_| ListenerError::Closed)
    }
}

/// A message received from the queue, bound to the listener that produced it.
#[derive(Debug)]
pub struct Message {
    delivery: Delivery,
    ack: AckHandle,
}

impl Message {
    pub(crate) fn new(raw: QueueMessage, acks: mpsc::Sender<Acknowledgement>) -> Self {
        let ack = AckHandle {
            message_id: raw.message_id.clone(),
            receipt_token: raw.receipt_handle.clone(),
            sender: acks,
        };

        Self {
            delivery: Delivery {
                id: raw.message_id,
                body: raw.body,
                receipt_token: raw.receipt_handle,
            },
            ack,
        }
    }

    pub fn id(&self) -> &str {
        &self.delivery.id
    }

    pub fn body(&self) -> &str {
        &self.delivery.body
    }

    pub fn receipt_token(&self) -> &str {
        &self.delivery.receipt_token
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    /// Splits the message so the content and the right to acknowledge it can
    /// travel separately.
    pub fn into_parts(self) -> (Delivery, AckHandle) {
        (self.delivery, self.ack)
    }

    /// Acknowledges the message. See [`AckHandle::ack`].
    pub async fn ack(self) -> Result<(), ListenerError> {
        self.ack.ack().await
    }
}

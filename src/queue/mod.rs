pub mod error;
pub mod health;
pub mod listener;
pub mod message;
pub mod mock;
pub mod source;
pub mod sqs;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ListenerError;
pub use health::HealthTracker;
pub use listener::{Listener, ListenerSettings, ListenerStreams, QueueListener};
pub use message::{AckHandle, Acknowledgement, Delivery, Message};
pub use mock::MockListener;
pub use source::{QueueMessage, QueueSource};
pub use sqs::SqsQueue;

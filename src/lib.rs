//! Continuous SQS listener.
//!
//! A [`queue::Listener`] long-polls a queue and streams [`queue::Message`]s to
//! a consumer. Consumers acknowledge messages through the handle each message
//! carries; acknowledgements are deleted from the queue by a separate task, so
//! slow deletes never hold up polling.
//!
//! The consumer must drain both the message and the error stream. Polling
//! blocks whenever either of them is full.

pub mod api;
pub mod cli;
pub mod metrics;
pub mod queue;
pub mod shutdown;
pub mod telemetry;
pub mod utils;
pub mod worker;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListenerError {
    /// The remote receive call failed. The receive loop keeps polling.
    #[error("could not receive messages: {0:#}")]
    Receive(anyhow::Error),

    /// Synthesized by the mock listener once every fixture has been emitted.
    #[error("no more messages")]
    FixturesExhausted,

    #[error("listener is already listening")]
    AlreadyListening,

    /// The acknowledge loop is gone, usually because the listener was shut down.
    #[error("listener is closed")]
    Closed,

    #[error("could not connect to queue service: {0:#}")]
    Connect(anyhow::Error),

    #[error("could not read fixture file {path}")]
    FixtureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid fixture file {path}")]
    FixtureFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Stale,
    NeverPolled,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Milliseconds since the last successful poll.
    pub last_poll_ms: Option<u64>,
    pub max_staleness_ms: u64,
    pub timestamp: DateTime<Utc>,
}

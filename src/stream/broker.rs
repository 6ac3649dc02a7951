use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One delivered stream entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMessage {
    /// Broker-assigned id, `<millis>-<seq>`
    pub id: String,
    pub payload: String,
}

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("unknown consumer group {group} on stream {stream}")]
    UnknownGroup { stream: String, group: String },

    #[error("broker is closed")]
    Closed,

    #[error("broker unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

/// Consumer-group stream operations used by the worker.
///
/// Delivered messages stay pending for their group until acknowledged.
#[async_trait]
pub trait StreamBroker: Send + Sync {
    /// Create the group, and the stream if missing. Existing groups are left as is.
    async fn create_group(&self, stream: &str, group: &str) -> Result<()>;

    /// Up to `max` messages for this consumer, without blocking. Entries left
    /// unacknowledged past the broker's idle time are delivered again.
    async fn poll_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max: usize,
    ) -> Result<Vec<StreamMessage>>;

    /// Acknowledge ids; returns how many were pending
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<usize>;

    /// Append a payload; returns its id
    async fn publish(&self, stream: &str, payload: &str) -> Result<String>;
}

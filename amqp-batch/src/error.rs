use thiserror::Error;

/// Failures surfaced by the broker connection and consumer construction.
///
/// Runtime broker errors (ack/reject/nack, lost delivery streams) never reach
/// this type; they are logged and recovered by reconnecting.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("amqp dial {endpoint}: {error:#}")]
    Dial {
        endpoint: String,
        error: anyhow::Error,
    },
    #[error("create amqp channel: {0:#}")]
    Channel(anyhow::Error),
    #[error("declare {what}: {error:#}")]
    Topology { what: String, error: anyhow::Error },
    #[error("consume queue {queue}: {error:#}")]
    Subscribe { queue: String, error: anyhow::Error },
    #[error("invalid consumer configuration: {0}")]
    InvalidConfig(String),
    #[error("a consumer for queue {0} is already registered")]
    DuplicateQueue(String),
}

//! Batch consumer for topic-based AMQP brokers.
//!
//! A [`BatchConsumer`] drains one queue into bounded batches (by size and by
//! linger time), hands every batch to a [`BatchHandler`] and reconciles the
//! handler's verdict with the broker's cumulative acknowledgment semantics.
//! The [`ConsumerRegistry`] runs a set of consumers side by side and shuts them
//! down together.
pub use anyhow;

pub mod batch;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod json;
mod metrics;
pub mod mq;
pub mod registry;
pub mod retry;

pub use batch::{resolve, Batch, BatchHandler, BatchOutcome, BrokerAction, HandlerVerdict, Rejection};
pub use config::{BatchConsumerConfig, BrokerConnectionConfig};
pub use connection::{BrokerConnection, Reconnect};
pub use consumer::{BatchConsumer, ConsumerState};
pub use error::BrokerError;
pub use json::{JsonBatchHandler, MessageError, MessageHandler};
pub use mq::{Delivery, DeliveryTag};
pub use registry::{ConsumerDefaults, ConsumerRegistry};
pub use retry::ReconnectPolicy;

pub use tokio_util::sync::CancellationToken;

/// Renders every metric collected by the consumers in the Prometheus text format.
pub fn get_metrics() -> anyhow::Result<String> {
    metrics::COUNTER.output()
}

pub(crate) fn generate_id() -> String {
    rusty_ulid::generate_ulid_string()
}

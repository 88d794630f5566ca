use std::{fmt, time::Duration};

use typed_builder::TypedBuilder;

use crate::error::BrokerError;

/// Where and as whom to connect. Immutable once built.
#[derive(TypedBuilder, Clone)]
pub struct BrokerConnectionConfig {
    #[builder(setter(into))]
    pub host: String,
    #[builder(default = 5672)]
    pub port: u16,
    #[builder(setter(into))]
    pub user: String,
    #[builder(setter(into))]
    pub password: String,
}

impl BrokerConnectionConfig {
    pub fn url(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}",
            self.user, self.password, self.host, self.port
        )
    }

    /// Same as [`url`](Self::url) without the password, for logs and errors.
    pub fn endpoint(&self) -> String {
        format!("amqp://{}:***@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for BrokerConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// One queue/exchange pair and its batching limits.
///
/// The queue is bound to the exchange with its own name as the binding key.
#[derive(TypedBuilder, Clone, Debug)]
pub struct BatchConsumerConfig {
    #[builder(setter(into))]
    pub queue: String,
    #[builder(setter(into))]
    pub exchange: String,
    /// Flush threshold in messages; also the channel prefetch count.
    #[builder(default = 100)]
    pub max_batch_size: u16,
    /// Maximum time a delivery waits in the buffer before the batch is flushed.
    #[builder(default = Duration::from_secs(10))]
    pub linger: Duration,
}

impl BatchConsumerConfig {
    pub(crate) fn validate(&self) -> Result<(), BrokerError> {
        if self.queue.is_empty() {
            return Err(BrokerError::InvalidConfig("queue name is empty".into()));
        }
        if self.max_batch_size == 0 {
            return Err(BrokerError::InvalidConfig(format!(
                "batch size of queue {} must be at least 1",
                self.queue
            )));
        }
        if self.linger.is_zero() {
            return Err(BrokerError::InvalidConfig(format!(
                "batch linger of queue {} must be longer than zero",
                self.queue
            )));
        }

        Ok(())
    }
}

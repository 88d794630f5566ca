use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::BrokerError,
    mq::{MqChannel, MqClient, MqConnection},
    retry::ReconnectPolicy,
};

/// Result of [`BrokerConnection::reconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    Restored,
    Cancelled,
}

/// Exactly one transport connection and one channel, owned by a single consumer.
///
/// A value of this type only exists while connected; [`close`](Self::close)
/// consumes it.
pub struct BrokerConnection {
    client: Arc<dyn MqClient>,
    policy: ReconnectPolicy,
    connection: Box<dyn MqConnection>,
    channel: Box<dyn MqChannel>,
}

impl BrokerConnection {
    /// Dials the broker and opens a channel on the new connection.
    pub async fn connect(
        client: Arc<dyn MqClient>,
        policy: ReconnectPolicy,
    ) -> Result<Self, BrokerError> {
        let (connection, channel) = dial(client.as_ref()).await?;

        Ok(Self {
            client,
            policy,
            connection,
            channel,
        })
    }

    pub fn channel(&self) -> &dyn MqChannel {
        self.channel.as_ref()
    }

    /// Re-establishes the channel, and the connection too if it is gone.
    ///
    /// Retries until it succeeds or `cancel` fires.
    pub async fn reconnect(&mut self, cancel: &CancellationToken) -> Reconnect {
        let mut attempt = 1;

        loop {
            match self.try_reconnect().await {
                Ok(()) => {
                    tracing::info!(attempt, "reconnected to rabbitmq");
                    return Reconnect::Restored;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "failed to establish rabbitmq connection, retrying"
                    );
                }
            }

            if !self.policy.wait(attempt, cancel).await {
                tracing::debug!(attempt, "reconnect abandoned by cancellation signal");
                return Reconnect::Cancelled;
            }
            attempt += 1;
        }
    }

    async fn try_reconnect(&mut self) -> Result<(), BrokerError> {
        if self.connection.is_connected() {
            self.channel = open_channel(self.connection.as_ref()).await?;
        } else {
            let (connection, channel) = dial(self.client.as_ref()).await?;
            self.connection = connection;
            self.channel = channel;
        }

        Ok(())
    }

    pub async fn close(self) {
        if let Err(e) = self.connection.close().await {
            tracing::debug!(error = %e, "closing rabbitmq connection failed");
        }
    }
}

async fn dial(
    client: &dyn MqClient,
) -> Result<(Box<dyn MqConnection>, Box<dyn MqChannel>), BrokerError> {
    let connection = client.connect().await.map_err(|error| BrokerError::Dial {
        endpoint: client.endpoint(),
        error,
    })?;
    let channel = open_channel(connection.as_ref()).await?;

    Ok((connection, channel))
}

async fn open_channel(connection: &dyn MqConnection) -> Result<Box<dyn MqChannel>, BrokerError> {
    connection
        .create_channel()
        .await
        .map_err(BrokerError::Channel)
}

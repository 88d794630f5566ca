use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::batch::{Batch, BatchHandler, BatchOutcome, HandlerVerdict};

/// Failure to process one decoded message.
#[derive(Error, Debug)]
pub enum MessageError {
    /// The message can never be processed; it is rejected and dropped.
    #[error("permanent: {0:#}")]
    Permanent(anyhow::Error),
    /// Something downstream is unavailable; the whole batch is requeued.
    #[error("transient: {0:#}")]
    Transient(anyhow::Error),
}

/// Handles one JSON message of type `T` at a time.
#[async_trait::async_trait]
pub trait MessageHandler<T>: Send + Sync {
    async fn handle(&self, message: T) -> Result<(), MessageError>;
}

/// [`BatchHandler`] that decodes every delivery as JSON and feeds it to a
/// [`MessageHandler`], in order.
///
/// Undecodable payloads and permanent errors are rejected individually. The
/// first transient error stops the batch and fails it as a whole.
pub struct JsonBatchHandler<T, H> {
    inner: H,
    message: PhantomData<fn() -> T>,
}

impl<T, H> JsonBatchHandler<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: MessageHandler<T>,
{
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            message: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<T, H> BatchHandler for JsonBatchHandler<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: MessageHandler<T>,
{
    async fn handle(&self, batch: &Batch) -> HandlerVerdict {
        let mut outcome = BatchOutcome::default();

        for delivery in batch {
            let message = match serde_json::from_slice::<T>(&delivery.payload) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        tag = delivery.tag,
                        bytes = delivery.payload.len(),
                        "Unknown message received: {}",
                        e
                    );
                    outcome.reject(delivery.tag, e);
                    continue;
                }
            };

            match self.inner.handle(message).await {
                Ok(()) => {
                    outcome.success(delivery.tag);
                }
                Err(MessageError::Permanent(e)) => {
                    outcome.reject(delivery.tag, e);
                }
                Err(MessageError::Transient(e)) => {
                    return Err(e.context(format!("message {}", delivery.tag)));
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{resolve, BrokerAction, Delivery};
    use serde_derive::Deserialize;
    use std::sync::Mutex;

    #[derive(Deserialize)]
    struct Greeting {
        name: String,
    }

    #[derive(Default)]
    struct Greeter {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MessageHandler<Greeting> for Greeter {
        async fn handle(&self, message: Greeting) -> Result<(), MessageError> {
            match message.name.as_str() {
                "nobody" => Err(MessageError::Permanent(anyhow::anyhow!("no receiver"))),
                "outage" => Err(MessageError::Transient(anyhow::anyhow!("mailer down"))),
                _ => {
                    self.seen.lock().unwrap().push(message.name);
                    Ok(())
                }
            }
        }
    }

    fn batch(payloads: &[&str]) -> Batch {
        Batch::new(
            payloads
                .iter()
                .enumerate()
                .map(|(i, p)| Delivery::new(i as u64 + 1, p.as_bytes()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn malformed_and_permanent_failures_are_rejected_individually() {
        let handler = JsonBatchHandler::<Greeting, _>::new(Greeter::default());
        let batch = batch(&[
            r#"{"name":"ada"}"#,
            "not json",
            r#"{"name":"nobody"}"#,
            r#"{"name":"grace"}"#,
        ]);

        let verdict = handler.handle(&batch).await;

        assert_eq!(
            vec![
                BrokerAction::Reject {
                    tag: 2,
                    requeue: false
                },
                BrokerAction::Reject {
                    tag: 3,
                    requeue: false
                },
                BrokerAction::Ack {
                    tag: 4,
                    multiple: true
                },
            ],
            resolve(&batch, &verdict)
        );
        assert_eq!(vec!["ada", "grace"], *handler.inner.seen.lock().unwrap());
    }

    #[tokio::test]
    async fn transient_failure_fails_the_whole_batch() {
        let handler = JsonBatchHandler::<Greeting, _>::new(Greeter::default());
        let batch = batch(&[r#"{"name":"ada"}"#, r#"{"name":"outage"}"#, r#"{"name":"grace"}"#]);

        let verdict = handler.handle(&batch).await;

        assert!(verdict.is_err());
        assert_eq!(vec!["ada"], *handler.inner.seen.lock().unwrap());
    }
}

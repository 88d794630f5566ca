use crate::mq::{Delivery, DeliveryTag};

/// Deliveries from one queue, in delivery order, handed to a [`BatchHandler`] at once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    deliveries: Vec<Delivery>,
}

impl Batch {
    pub fn new(deliveries: Vec<Delivery>) -> Self {
        debug_assert!(
            deliveries.windows(2).all(|w| w[0].tag < w[1].tag),
            "delivery tags within a batch must be strictly increasing"
        );

        Self { deliveries }
    }

    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Delivery> {
        self.deliveries.iter()
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    pub fn last_tag(&self) -> Option<DeliveryTag> {
        self.deliveries.last().map(|d| d.tag)
    }

    pub fn tags(&self) -> Vec<DeliveryTag> {
        self.deliveries.iter().map(|d| d.tag).collect()
    }
}

impl<'b> IntoIterator for &'b Batch {
    type Item = &'b Delivery;
    type IntoIter = std::slice::Iter<'b, Delivery>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A message the handler examined and will never be able to process.
#[derive(Debug)]
pub struct Rejection {
    pub tag: DeliveryTag,
    pub error: anyhow::Error,
}

/// Per-message outcome of a batch the handler could evaluate.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Highest tag processed successfully. Every tag up to it that is not in
    /// `rejected` is acknowledged with one cumulative ack.
    pub last_success_tag: Option<DeliveryTag>,
    pub rejected: Vec<Rejection>,
}

impl BatchOutcome {
    pub fn success(&mut self, tag: DeliveryTag) -> &mut Self {
        self.last_success_tag = Some(self.last_success_tag.map_or(tag, |t| t.max(tag)));
        self
    }

    pub fn reject(&mut self, tag: DeliveryTag, error: impl Into<anyhow::Error>) -> &mut Self {
        self.rejected.push(Rejection {
            tag,
            error: error.into(),
        });
        self
    }
}

/// `Err` is a fatal error: per-message outcomes are unknown and the whole
/// batch goes back to the queue.
pub type HandlerVerdict = Result<BatchOutcome, anyhow::Error>;

/// Business logic for one queue. Called with non-empty batches, never
/// concurrently for the same queue.
#[async_trait::async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &Batch) -> HandlerVerdict;
}

/// Acknowledgment call to issue on the consumer's channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerAction {
    Ack { tag: DeliveryTag, multiple: bool },
    Reject { tag: DeliveryTag, requeue: bool },
    Nack { tag: DeliveryTag, multiple: bool, requeue: bool },
}

impl BrokerAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrokerAction::Ack { .. } => "ack",
            BrokerAction::Reject { .. } => "reject",
            BrokerAction::Nack { .. } => "nack",
        }
    }
}

/// Turns a handler verdict into the broker calls that settle `batch`.
///
/// * fatal error: one nack with requeue covering the whole batch;
/// * otherwise one reject without requeue per rejected tag, then one
///   cumulative ack up to `last_success_tag`, if any.
pub fn resolve(batch: &Batch, verdict: &HandlerVerdict) -> Vec<BrokerAction> {
    let Some(last_tag) = batch.last_tag() else {
        return Vec::default();
    };

    let outcome = match verdict {
        Ok(outcome) => outcome,
        Err(_) => {
            return vec![BrokerAction::Nack {
                tag: last_tag,
                multiple: true,
                requeue: true,
            }]
        }
    };

    let mut actions: Vec<_> = outcome
        .rejected
        .iter()
        .map(|rejection| BrokerAction::Reject {
            tag: rejection.tag,
            requeue: false,
        })
        .collect();

    if let Some(tag) = outcome.last_success_tag.filter(|tag| *tag != 0) {
        actions.push(BrokerAction::Ack {
            tag,
            multiple: true,
        });
    }

    actions
}

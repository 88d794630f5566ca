use std::sync::Arc;

use tokio::{
    sync::watch,
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    batch::{resolve, Batch, BatchHandler, BrokerAction, HandlerVerdict},
    config::BatchConsumerConfig,
    connection::{BrokerConnection, Reconnect},
    error::BrokerError,
    metrics,
    mq::{Delivery, MqClient, MqConsumer},
    retry::ReconnectPolicy,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Registered, not connected yet.
    Created,
    /// Topology declared and prefetch applied.
    Declaring,
    Consuming,
    Reconnecting,
    /// Terminal.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
enum Flush {
    Size,
    Timer,
    Shutdown,
}

impl Flush {
    fn as_str(&self) -> &'static str {
        match self {
            Flush::Size => "size",
            Flush::Timer => "timer",
            Flush::Shutdown => "shutdown",
        }
    }
}

/// Drains one queue into batches and settles them with the broker according
/// to what its [`BatchHandler`] reports.
pub struct BatchConsumer {
    config: BatchConsumerConfig,
    connection: BrokerConnection,
    handler: Arc<dyn BatchHandler>,
    policy: ReconnectPolicy,
    consumer_tag: String,
    state: watch::Sender<ConsumerState>,
    span: tracing::Span,
}

impl BatchConsumer {
    /// Connects and declares the exchange, the queue and their binding, then
    /// sets the channel prefetch to the batch size.
    pub async fn new(
        config: BatchConsumerConfig,
        handler: Arc<dyn BatchHandler>,
        client: Arc<dyn MqClient>,
        policy: ReconnectPolicy,
    ) -> Result<Self, BrokerError> {
        config.validate()?;

        let span = tracing::info_span!("batch_consumer", queue = %config.queue);
        let (state, _) = watch::channel(ConsumerState::Created);

        let connection = BrokerConnection::connect(client, policy)
            .instrument(span.clone())
            .await?;

        let consumer = Self {
            consumer_tag: format!("{}-{}", config.queue, crate::generate_id()),
            config,
            connection,
            handler,
            policy,
            state,
            span,
        };

        if let Err(e) = consumer.declare().instrument(consumer.span.clone()).await {
            consumer.connection.close().await;
            return Err(e);
        }

        Ok(consumer)
    }

    pub fn queue_name(&self) -> &str {
        &self.config.queue
    }

    pub fn config(&self) -> &BatchConsumerConfig {
        &self.config
    }

    pub fn state(&self) -> ConsumerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Closes a consumer that was never started.
    pub async fn close(self) {
        self.set_state(ConsumerState::Stopped);
        self.connection.close().await;
    }

    fn set_state(&self, state: ConsumerState) {
        tracing::trace!(?state, "consumer state");
        self.state.send_replace(state);
    }

    async fn declare(&self) -> Result<(), BrokerError> {
        let cfg = &self.config;
        let channel = self.connection.channel();

        channel
            .declare_exchange(&cfg.exchange)
            .await
            .map_err(|error| BrokerError::Topology {
                what: format!("amqp exchange {}", cfg.exchange),
                error,
            })?;
        channel
            .declare_queue(&cfg.queue)
            .await
            .map_err(|error| BrokerError::Topology {
                what: format!("amqp queue {}", cfg.queue),
                error,
            })?;
        channel
            .bind_queue(&cfg.queue, &cfg.exchange, &cfg.queue)
            .await
            .map_err(|error| BrokerError::Topology {
                what: format!("binding of queue {} to exchange {}", cfg.queue, cfg.exchange),
                error,
            })?;
        channel
            .set_prefetch(cfg.max_batch_size)
            .await
            .map_err(|error| BrokerError::Topology {
                what: format!("amqp qos {}", cfg.max_batch_size),
                error,
            })?;

        self.set_state(ConsumerState::Declaring);
        tracing::info!("connection to rabbitmq for {} queue established", cfg.queue);

        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn MqConsumer>, BrokerError> {
        self.connection
            .channel()
            .consume(&self.config.queue, &self.consumer_tag)
            .await
            .map_err(|error| BrokerError::Subscribe {
                queue: self.config.queue.clone(),
                error,
            })
    }

    /// Consumes until `cancel` fires, then flushes what is buffered and closes
    /// the connection.
    pub async fn consume(self, cancel: CancellationToken) {
        let span = self.span.clone();
        self.run(cancel).instrument(span).await
    }

    async fn run(mut self, cancel: CancellationToken) {
        let max_batch_size = usize::from(self.config.max_batch_size);

        let mut deliveries = match self.subscribe().await {
            Ok(deliveries) => Some(deliveries),
            Err(e) => {
                tracing::error!(error = %e, "consume failed");
                self.resubscribe(&cancel).await
            }
        };
        let mut buffer = self.new_batch_buffer();
        let mut ticker = self.new_ticker();

        if deliveries.is_some() {
            self.set_state(ConsumerState::Consuming);
        }

        while let Some(stream) = deliveries.as_mut() {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::debug!("rabbitmq consumer for queue {} is stopped by context signal", self.queue_name());
                    let batch = std::mem::take(&mut buffer);
                    self.process_batch(Flush::Shutdown, batch).await;
                    break;
                }
                _ = ticker.tick() => {
                    tracing::trace!("processing messages in queue {} by ticker signal", self.queue_name());
                    let batch = std::mem::replace(&mut buffer, self.new_batch_buffer());
                    self.process_batch(Flush::Timer, batch).await;
                }
                delivery = stream.next() => match delivery {
                    Some(Ok(delivery)) => {
                        buffer.push(delivery);
                        if buffer.len() < max_batch_size {
                            continue;
                        }

                        let batch = std::mem::replace(&mut buffer, self.new_batch_buffer());
                        self.process_batch(Flush::Size, batch).await;
                    }
                    closed => {
                        match closed {
                            Some(Err(e)) => tracing::warn!(error = %e, discarded = buffer.len(), "delivery stream failed"),
                            _ => tracing::warn!(discarded = buffer.len(), "delivery stream closed"),
                        }

                        // unacknowledged deliveries come back once the old channel is gone
                        buffer.clear();
                        deliveries = self.resubscribe(&cancel).await;
                        if deliveries.is_some() {
                            self.set_state(ConsumerState::Consuming);
                        }
                        ticker = self.new_ticker();
                    }
                }
            }
        }

        self.set_state(ConsumerState::Stopped);
        self.connection.close().await;
        tracing::info!("rabbitmq consumer for queue {} stopped", self.config.queue);
    }

    /// Reconnects, re-declares topology (prefetch is per channel) and
    /// subscribes again. `None` if cancelled on the way.
    async fn resubscribe(&mut self, cancel: &CancellationToken) -> Option<Box<dyn MqConsumer>> {
        let mut attempt = 1;

        loop {
            self.set_state(ConsumerState::Reconnecting);

            if self.connection.reconnect(cancel).await == Reconnect::Cancelled {
                return None;
            }
            metrics::COUNTER
                .reconnects
                .with_label_values(&[self.queue_name()])
                .inc();

            let subscribed = match self.declare().await {
                Ok(()) => self.subscribe().await,
                Err(e) => Err(e),
            };
            match subscribed {
                Ok(deliveries) => return Some(deliveries),
                Err(e) => tracing::warn!(attempt, error = %e, "resubscribe failed, retrying"),
            }

            if !self.policy.wait(attempt, cancel).await {
                return None;
            }
            attempt += 1;
        }
    }

    async fn process_batch(&self, trigger: Flush, messages: Vec<Delivery>) {
        if messages.is_empty() {
            return;
        }

        let queue = self.queue_name();
        metrics::COUNTER
            .flushes
            .with_label_values(&[queue, trigger.as_str()])
            .inc();

        let batch = Batch::new(messages);
        let verdict = self.handler.handle(&batch).await;
        self.log_verdict(&batch, &verdict);

        for action in resolve(&batch, &verdict) {
            let channel = self.connection.channel();
            let result = match action {
                BrokerAction::Ack { tag, multiple } => channel.ack(tag, multiple).await,
                BrokerAction::Reject { tag, requeue } => channel.reject(tag, requeue).await,
                BrokerAction::Nack {
                    tag,
                    multiple,
                    requeue,
                } => channel.nack(tag, multiple, requeue).await,
            };

            match result {
                Ok(()) => record(queue, &action),
                Err(e) => {
                    metrics::COUNTER
                        .broker_call_failures
                        .with_label_values(&[queue, action.name()])
                        .inc();
                    tracing::error!(error = %e, ?action, "{} failed", action.name());
                }
            }
        }
    }

    fn log_verdict(&self, batch: &Batch, verdict: &HandlerVerdict) {
        match verdict {
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), size = batch.len(), "batch handle failed");
            }
            Ok(outcome) => {
                for rejection in &outcome.rejected {
                    let payload = batch
                        .iter()
                        .find(|d| d.tag == rejection.tag)
                        .map(|d| String::from_utf8_lossy(&d.payload).into_owned());
                    tracing::error!(
                        tag = rejection.tag,
                        error = %format!("{:#}", rejection.error),
                        payload = ?payload,
                        "handle failed in queue {}",
                        self.queue_name()
                    );
                }
                if let Some(tag) = outcome.last_success_tag {
                    tracing::debug!(
                        size = batch.len(),
                        "processed batch from queue {}, last success tag {}",
                        self.queue_name(),
                        tag
                    );
                }
            }
        }
    }

    fn new_batch_buffer(&self) -> Vec<Delivery> {
        Vec::with_capacity(usize::from(self.config.max_batch_size))
    }

    fn new_ticker(&self) -> Interval {
        let linger = self.config.linger;
        let mut ticker = tokio::time::interval_at(Instant::now() + linger, linger);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}

fn record(queue: &str, action: &BrokerAction) {
    match action {
        BrokerAction::Ack { .. } => metrics::COUNTER
            .acks
            .with_label_values(&[queue])
            .inc(),
        BrokerAction::Reject { .. } => metrics::COUNTER
            .messages_rejected
            .with_label_values(&[queue])
            .inc(),
        BrokerAction::Nack { .. } => metrics::COUNTER
            .batches_requeued
            .with_label_values(&[queue])
            .inc(),
    }
}

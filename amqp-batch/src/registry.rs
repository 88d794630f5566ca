use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    batch::BatchHandler,
    config::BatchConsumerConfig,
    consumer::{BatchConsumer, ConsumerState},
    error::BrokerError,
    mq::MqClient,
    retry::ReconnectPolicy,
};

/// Settings applied to consumers registered without their own config.
#[derive(TypedBuilder, Clone, Copy, Debug)]
pub struct ConsumerDefaults {
    #[builder(default = 100)]
    pub max_batch_size: u16,
    #[builder(default = Duration::from_secs(10))]
    pub linger: Duration,
    #[builder(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for ConsumerDefaults {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The batch consumers of one process, started and stopped together.
pub struct ConsumerRegistry {
    client: Arc<dyn MqClient>,
    defaults: ConsumerDefaults,
    pending: HashMap<String, BatchConsumer>,
    states: HashMap<String, tokio::sync::watch::Receiver<ConsumerState>>,
    cancel: CancellationToken,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl ConsumerRegistry {
    pub fn new(client: Arc<dyn MqClient>, defaults: ConsumerDefaults) -> Self {
        Self {
            client,
            defaults,
            pending: HashMap::default(),
            states: HashMap::default(),
            cancel: CancellationToken::new(),
            workers: Vec::default(),
        }
    }

    /// Connects a consumer for `queue` bound to `exchange`, using the registry defaults.
    pub async fn register(
        &mut self,
        queue: &str,
        exchange: &str,
        handler: Arc<dyn BatchHandler>,
    ) -> Result<(), BrokerError> {
        let config = BatchConsumerConfig::builder()
            .queue(queue)
            .exchange(exchange)
            .max_batch_size(self.defaults.max_batch_size)
            .linger(self.defaults.linger)
            .build();

        self.register_with(config, handler).await
    }

    pub async fn register_with(
        &mut self,
        config: BatchConsumerConfig,
        handler: Arc<dyn BatchHandler>,
    ) -> Result<(), BrokerError> {
        if self.states.contains_key(&config.queue) {
            return Err(BrokerError::DuplicateQueue(config.queue));
        }

        let consumer = BatchConsumer::new(
            config,
            handler,
            self.client.clone(),
            self.defaults.reconnect,
        )
        .await?;

        let queue = consumer.queue_name().to_owned();
        self.states.insert(queue.clone(), consumer.subscribe_state());
        self.pending.insert(queue, consumer);

        Ok(())
    }

    /// Starts every registered consumer that is not running yet, each on its own task.
    pub fn run(&mut self) {
        for (queue, consumer) in self.pending.drain() {
            let cancel = self.cancel.clone();
            tracing::debug!("start consuming rabbitmq queue {}", queue);

            self.workers
                .push((queue, tokio::spawn(consumer.consume(cancel))));
        }
    }

    pub fn queues(&self) -> Vec<String> {
        let mut queues: Vec<_> = self.states.keys().cloned().collect();
        queues.sort();
        queues
    }

    pub fn state(&self, queue: &str) -> Option<ConsumerState> {
        self.states.get(queue).map(|state| *state.borrow())
    }

    /// The token shared by all consumers; cancelling it has the same effect as [`stop`](Self::stop)
    /// without waiting.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Signals every consumer to flush and close, and waits until all of them have.
    pub async fn stop(mut self) {
        self.cancel.cancel();

        let (queues, handles): (Vec<_>, Vec<_>) = self.workers.drain(..).unzip();
        let results = futures::future::join_all(handles).await;

        for (queue, result) in queues.into_iter().zip(results) {
            if let Err(e) = result {
                tracing::error!(error = %e, "consumer for queue {} ended abnormally", queue);
            }
        }

        for (queue, consumer) in self.pending.drain() {
            tracing::debug!("closing consumer for queue {} that never started", queue);
            consumer.close().await;
        }
    }
}

pub mod amqp;

/// Channel-scoped, monotonically increasing identifier of a delivery.
pub type DeliveryTag = u64;

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub payload: Vec<u8>,
    pub redelivered: bool,
    pub exchange: String,
    pub routing_key: String,
}

impl Delivery {
    pub fn new(tag: DeliveryTag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
            redelivered: false,
            exchange: String::default(),
            routing_key: String::default(),
        }
    }
}

#[async_trait::async_trait]
pub trait MqClient: Send + Sync {
    /// Printable broker address, credentials redacted.
    fn endpoint(&self) -> String;
    async fn connect(&self) -> anyhow::Result<Box<dyn MqConnection>>;
}

#[async_trait::async_trait]
pub trait MqConnection: Send + Sync {
    fn is_connected(&self) -> bool;
    async fn create_channel(&self) -> anyhow::Result<Box<dyn MqChannel>>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait MqChannel: Send + Sync {
    async fn declare_exchange(&self, exchange: &str) -> anyhow::Result<()>;
    async fn declare_queue(&self, queue: &str) -> anyhow::Result<()>;
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str)
        -> anyhow::Result<()>;
    /// Channel-wide prefetch limit.
    async fn set_prefetch(&self, count: u16) -> anyhow::Result<()>;
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> anyhow::Result<Box<dyn MqConsumer>>;

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> anyhow::Result<()>;
    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> anyhow::Result<()>;
    async fn nack(&self, tag: DeliveryTag, multiple: bool, requeue: bool) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait MqConsumer: Send {
    /// `None`, or an error item, means the delivery stream is gone.
    async fn next(&mut self) -> Option<anyhow::Result<Delivery>>;
}

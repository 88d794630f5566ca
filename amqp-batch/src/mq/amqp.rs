use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};

use super::{Delivery, DeliveryTag, MqChannel, MqClient, MqConnection, MqConsumer};
use crate::config::BrokerConnectionConfig;

/// AMQP 0-9-1 client backed by `lapin`.
pub struct RabbitMq {
    config: BrokerConnectionConfig,
}

pub(crate) struct RabbitConnection(Connection);

pub(crate) struct RabbitChannel(Channel);

pub(crate) struct Consumer {
    inner: lapin::Consumer,
}

impl RabbitMq {
    pub fn new(config: BrokerConnectionConfig) -> Self {
        Self { config }
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            tag: value.delivery_tag,
            payload: value.data,
            redelivered: value.redelivered,
            exchange: value.exchange.as_str().to_owned(),
            routing_key: value.routing_key.as_str().to_owned(),
        }
    }
}

#[async_trait::async_trait]
impl MqClient for RabbitMq {
    fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    async fn connect(&self) -> anyhow::Result<Box<dyn MqConnection>> {
        let connection =
            Connection::connect(&self.config.url(), ConnectionProperties::default()).await?;

        Ok(Box::new(RabbitConnection(connection)))
    }
}

#[async_trait::async_trait]
impl MqConnection for RabbitConnection {
    fn is_connected(&self) -> bool {
        self.0.status().connected()
    }

    async fn create_channel(&self) -> anyhow::Result<Box<dyn MqChannel>> {
        let channel = self.0.create_channel().await?;

        Ok(Box::new(RabbitChannel(channel)))
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(self.0.close(200, "consumer stopped").await?)
    }
}

#[async_trait::async_trait]
impl MqChannel for RabbitChannel {
    async fn declare_exchange(&self, exchange: &str) -> anyhow::Result<()> {
        self.0
            .exchange_declare(
                exchange,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> anyhow::Result<()> {
        let _q = self
            .0
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(())
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> anyhow::Result<()> {
        Ok(self
            .0
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?)
    }

    async fn set_prefetch(&self, count: u16) -> anyhow::Result<()> {
        Ok(self
            .0
            .basic_qos(count, BasicQosOptions { global: true })
            .await?)
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> anyhow::Result<Box<dyn MqConsumer>> {
        let consumer = self
            .0
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(Box::new(Consumer { inner: consumer }))
    }

    async fn ack(&self, tag: DeliveryTag, multiple: bool) -> anyhow::Result<()> {
        Ok(self.0.basic_ack(tag, BasicAckOptions { multiple }).await?)
    }

    async fn reject(&self, tag: DeliveryTag, requeue: bool) -> anyhow::Result<()> {
        Ok(self
            .0
            .basic_reject(tag, BasicRejectOptions { requeue })
            .await?)
    }

    async fn nack(&self, tag: DeliveryTag, multiple: bool, requeue: bool) -> anyhow::Result<()> {
        Ok(self
            .0
            .basic_nack(tag, BasicNackOptions { multiple, requeue })
            .await?)
    }
}

#[async_trait::async_trait]
impl MqConsumer for Consumer {
    async fn next(&mut self) -> Option<anyhow::Result<Delivery>> {
        let msg = self.inner.next().await.map(|delivery| {
            delivery
                .map_err(anyhow::Error::from)
                .map(Delivery::from)
        });

        if msg.is_none() {
            tracing::warn!("Subscriber ended");
        };

        msg
    }
}

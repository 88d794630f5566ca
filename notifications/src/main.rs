//! Drains user and todo events from RabbitMQ and mails the matching notifications.
use std::sync::Arc;

use amqp_batch::{mq::amqp::RabbitMq, ConsumerRegistry, JsonBatchHandler};
use anyhow::Context;
use envconfig::Envconfig;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    config::Config,
    handlers::{TodosMessages, UsersMessages},
    mailer::{LogMailer, Mailer, SmtpMailer},
    models::{TodoMailItem, UserMailItem},
};

mod config;
mod handlers;
mod mailer;
mod models;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init_from_env().context("invalid configuration")?;
    init_tracing(&config);

    let span = tracing::info_span!("service", name = %config.log_index);
    run(config).instrument(span).await
}

fn init_tracing(config: &Config) {
    let default_level = if config.log_is_debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("starting notifications service");

    let client = Arc::new(RabbitMq::new(config.broker()));
    let mailer: Arc<dyn Mailer> = match config.smtp() {
        Some(smtp) => {
            tracing::info!(
                host = %smtp.host,
                port = smtp.port,
                "sending mail through smtp relay"
            );
            Arc::new(SmtpMailer::new(&smtp).context("create smtp mailer")?)
        }
        None => {
            tracing::warn!("SMTP_HOST is not set, mail will only be logged");
            Arc::new(LogMailer::new(config.mail_sender.clone()))
        }
    };
    let mut registry = ConsumerRegistry::new(client, config.consumer_defaults());

    registry
        .register(
            &config.users_queue,
            &config.users_exchange,
            Arc::new(JsonBatchHandler::<UserMailItem, _>::new(
                UsersMessages::new(mailer.clone()),
            )),
        )
        .await
        .context("create users rabbitmq consumer")?;
    registry
        .register(
            &config.todos_queue,
            &config.todos_exchange,
            Arc::new(JsonBatchHandler::<TodoMailItem, _>::new(
                TodosMessages::new(mailer),
            )),
        )
        .await
        .context("create todos rabbitmq consumer")?;

    registry.run();

    tokio::signal::ctrl_c()
        .await
        .context("listen for shutdown signal")?;
    tracing::info!("shutdown signal received, draining consumers");
    registry.stop().await;

    match amqp_batch::get_metrics() {
        Ok(metrics) => tracing::debug!("final metrics:\n{}", metrics),
        Err(e) => tracing::warn!(error = %e, "unable to render metrics"),
    }

    Ok(())
}

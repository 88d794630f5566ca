use std::str::FromStr;
use std::time;

use amqp_batch::{BrokerConnectionConfig, ConsumerDefaults, ReconnectPolicy};
use envconfig::Envconfig;

use crate::mailer::SmtpConfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "RABBITMQ_HOST", default = "localhost")]
    pub rabbitmq_host: String,

    #[envconfig(from = "RABBITMQ_PORT", default = "5672")]
    pub rabbitmq_port: u16,

    #[envconfig(from = "RABBITMQ_USER", default = "user")]
    pub rabbitmq_user: String,

    #[envconfig(from = "RABBITMQ_PASSWORD", default = "user")]
    pub rabbitmq_password: String,

    #[envconfig(from = "RABBITMQ_BATCH_SIZE", default = "100")]
    pub batch_size: u16,

    #[envconfig(from = "RABBITMQ_BATCH_WAIT_TIME_MS", default = "10000")]
    pub batch_wait_time: EnvMsDuration,

    #[envconfig(from = "RABBITMQ_RECONNECT_MAX_MS", default = "30000")]
    pub reconnect_max: EnvMsDuration,

    #[envconfig(from = "RABBITMQ_USERS_EXCHANGE", default = "users.exchange")]
    pub users_exchange: String,

    #[envconfig(from = "RABBITMQ_USERS_QUEUE", default = "users.queue")]
    pub users_queue: String,

    #[envconfig(from = "RABBITMQ_TODOS_EXCHANGE", default = "todos.exchange")]
    pub todos_exchange: String,

    #[envconfig(from = "RABBITMQ_TODOS_QUEUE", default = "todos.queue")]
    pub todos_queue: String,

    #[envconfig(from = "LOG_INDEX", default = "notifications")]
    pub log_index: String,

    #[envconfig(from = "LOG_IS_DEBUG", default = "false")]
    pub log_is_debug: bool,

    #[envconfig(from = "MAIL_SENDER", default = "noreply@localhost")]
    pub mail_sender: String,

    /// Without a relay, mail is only logged.
    #[envconfig(from = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[envconfig(from = "SMTP_PORT", default = "587")]
    pub smtp_port: u16,

    #[envconfig(from = "SMTP_USER", default = "")]
    pub smtp_user: String,

    #[envconfig(from = "SMTP_PASSWORD", default = "")]
    pub smtp_password: String,
}

impl Config {
    pub fn broker(&self) -> BrokerConnectionConfig {
        BrokerConnectionConfig::builder()
            .host(self.rabbitmq_host.clone())
            .port(self.rabbitmq_port)
            .user(self.rabbitmq_user.clone())
            .password(self.rabbitmq_password.clone())
            .build()
    }

    pub fn smtp(&self) -> Option<SmtpConfig> {
        let host = self.smtp_host.clone()?;

        Some(SmtpConfig {
            host,
            port: self.smtp_port,
            user: self.smtp_user.clone(),
            password: self.smtp_password.clone(),
            sender: self.mail_sender.clone(),
        })
    }

    pub fn consumer_defaults(&self) -> ConsumerDefaults {
        let reconnect = ReconnectPolicy {
            maximum_interval: self.reconnect_max.0,
            ..Default::default()
        };

        ConsumerDefaults::builder()
            .max_batch_size(self.batch_size)
            .linger(self.batch_wait_time.0)
            .reconnect(reconnect)
            .build()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub time::Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(time::Duration::from_millis(ms)))
    }
}

use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{
        authentication::{Credentials, Mechanism},
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::models::Mail;

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()>;
}

/// SMTP relay and the account mail is sent from.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub sender: String,
}

/// Sends mail through an SMTP relay, with PLAIN authentication and STARTTLS
/// when the relay offers it.
pub struct SmtpMailer {
    sender: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let sender = config
            .sender
            .parse::<Mailbox>()
            .with_context(|| format!("invalid sender address {}", config.sender))?;
        let tls = TlsParameters::new(config.host.clone()).context("smtp tls parameters")?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            .port(config.port)
            .tls(Tls::Opportunistic(tls))
            .credentials(Credentials::new(
                config.user.clone(),
                config.password.clone(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build();

        Ok(Self { sender, transport })
    }

    fn message(&self, mail: &Mail) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(self.sender.clone())
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_HTML);
        for receiver in &mail.receivers {
            let to = receiver
                .parse::<Mailbox>()
                .with_context(|| format!("invalid receiver address {}", receiver))?;
            builder = builder.to(to);
        }

        Ok(builder.body(mail.body.clone())?)
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        let message = self.message(mail)?;
        let response = self
            .transport
            .send(message)
            .await
            .context("smtp send")?;

        tracing::debug!(
            to = ?mail.receivers,
            subject = %mail.subject,
            code = %response.code(),
            "mail sent"
        );

        Ok(())
    }
}

/// Writes outgoing mail to the log. Used when no SMTP relay is configured.
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait::async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> anyhow::Result<()> {
        tracing::info!(
            from = %self.sender,
            to = ?mail.receivers,
            subject = %mail.subject,
            bytes = mail.body.len(),
            "mail sent"
        );

        Ok(())
    }
}

use std::sync::Arc;

use amqp_batch::{MessageError, MessageHandler};

use crate::{
    mailer::Mailer,
    models::{Mail, MailError, TodoMailItem, UserMailItem},
};

/// Mails for events from the users service.
pub struct UsersMessages {
    mailer: Arc<dyn Mailer>,
}

/// Mails for events from the todo service.
pub struct TodosMessages {
    mailer: Arc<dyn Mailer>,
}

impl UsersMessages {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

impl TodosMessages {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait::async_trait]
impl MessageHandler<UserMailItem> for UsersMessages {
    async fn handle(&self, item: UserMailItem) -> Result<(), MessageError> {
        deliver(self.mailer.as_ref(), item.render()).await
    }
}

#[async_trait::async_trait]
impl MessageHandler<TodoMailItem> for TodosMessages {
    async fn handle(&self, item: TodoMailItem) -> Result<(), MessageError> {
        deliver(self.mailer.as_ref(), item.render()).await
    }
}

async fn deliver(mailer: &dyn Mailer, mail: Result<Mail, MailError>) -> Result<(), MessageError> {
    let mail = mail.map_err(|e| MessageError::Permanent(e.into()))?;

    mailer
        .send(&mail)
        .await
        .map_err(|e| MessageError::Transient(e.context("send mail")))
}

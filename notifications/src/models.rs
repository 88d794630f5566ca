use serde_derive::Deserialize;
use thiserror::Error;

pub const USER_EVENT_TYPE_EMAIL_VERIFICATION: &str = "user_verify_email";
pub const USER_EVENT_TYPE_RESET_PASSWORD: &str = "user_reset_password";
pub const TODO_EVENT_TYPE_EMAIL_VERIFICATION: &str = "todo_verify_email";

const EMAIL_SUBJECT_EMAIL_VERIFICATION: &str = "Verify email";
const EMAIL_SUBJECT_RESET_PASSWORD: &str = "Reset password";

/// Event published by the users service.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UserMailItem {
    pub user_event_type: String,
    pub receivers: Vec<String>,
    pub link: String,
}

/// Event published by the todo service.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TodoMailItem {
    pub todo_event_type: String,
    pub receivers: Vec<String>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub receivers: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MailError {
    #[error("incorrect event type {0}")]
    IncorrectEventType(String),
    #[error("event has no receivers")]
    NoReceivers,
    #[error("invalid receiver address {0}")]
    InvalidReceiver(String),
}

impl UserMailItem {
    pub fn render(&self) -> Result<Mail, MailError> {
        let (subject, body) = match self.user_event_type.as_str() {
            USER_EVENT_TYPE_EMAIL_VERIFICATION => (
                EMAIL_SUBJECT_EMAIL_VERIFICATION,
                action_email(VERIFY_EMAIL_TEXT, "Verify", &self.link),
            ),
            USER_EVENT_TYPE_RESET_PASSWORD => (
                EMAIL_SUBJECT_RESET_PASSWORD,
                action_email(RESET_PASSWORD_TEXT, "Reset", &self.link),
            ),
            other => return Err(MailError::IncorrectEventType(other.to_owned())),
        };

        Mail::new(&self.receivers, subject, body)
    }
}

impl TodoMailItem {
    pub fn render(&self) -> Result<Mail, MailError> {
        let (subject, body) = match self.todo_event_type.as_str() {
            TODO_EVENT_TYPE_EMAIL_VERIFICATION => (
                EMAIL_SUBJECT_EMAIL_VERIFICATION,
                action_email(VERIFY_EMAIL_TEXT, "Verify", &self.link),
            ),
            other => return Err(MailError::IncorrectEventType(other.to_owned())),
        };

        Mail::new(&self.receivers, subject, body)
    }
}

impl Mail {
    fn new(receivers: &[String], subject: &str, body: String) -> Result<Self, MailError> {
        if receivers.is_empty() {
            return Err(MailError::NoReceivers);
        }
        if let Some(bad) = receivers.iter().find(|r| !is_address(r)) {
            return Err(MailError::InvalidReceiver(bad.clone()));
        }

        Ok(Self {
            receivers: receivers.to_vec(),
            subject: subject.to_owned(),
            body,
        })
    }
}

fn is_address(receiver: &str) -> bool {
    match receiver.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty() && !domain.contains('@'),
        None => false,
    }
}

const VERIFY_EMAIL_TEXT: &str = r#"
    <p>Thank you for registering.</p>
    <p>One last step left - please verify your email address by clicking the button below.</p>"#;

const RESET_PASSWORD_TEXT: &str = r#"
    <p>Someone requested password reset for your account.</p>
    <p>If it was not you - just ignore message.</p>
    <p>If it was you - click the button</p>"#;

fn action_email(text: &str, button: &str, link: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <style>
    .button {{
      background-color: #007bff;
      border: none;
      color: white;
      padding: 15px 32px;
      text-align: center;
      text-decoration: none;
      display: inline-block;
      font-size: 16px;
      margin: 4px 2px;
      cursor: pointer;
      border-radius: 5px;
    }}
  </style>
</head>
<body>
{text}

  <a href="{link}" class="button">{button}</a>
</body>
</html>
"#
    )
}

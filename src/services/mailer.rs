use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail service rejected message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

/// Delivers through a JSON mail API (`POST {url}` with a bearer key).
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn new(url: String, api_key: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            from,
        }
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&OutgoingMail {
                from: &self.from,
                to: &email.to,
                subject: &email.subject,
                html: &email.html,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {body}")));
        }

        tracing::info!("Email '{}' sent to {}", email.subject, email.to);
        Ok(())
    }
}

/// Used when no mail API is configured; writes the message to the log instead.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        tracing::info!(to = %email.to, subject = %email.subject, "Mail delivery disabled, message not sent");
        Ok(())
    }
}

/// Keeps every message in memory. Handy for asserting on outgoing mail in tests.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<Email>>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        self.sent.lock().await.push(email);
        Ok(())
    }
}

pub fn petition_confirmation(to: &str, name: &str, petition_title: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Your petition has been created".to_string(),
        html: format!(
            "<h2>Thank you, {name}!</h2>\
             <p>Your petition <strong>{petition_title}</strong> is now live and open for signatures.</p>\
             <p>We will let you know when officials respond.</p>"
        ),
    }
}

pub fn status_update(to: &str, name: &str, subject_title: &str, status: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: format!("Status update: {subject_title}"),
        html: format!(
            "<h2>Hello {name},</h2>\
             <p>The status of <strong>{subject_title}</strong> changed to <strong>{status}</strong>.</p>"
        ),
    }
}

pub fn volunteer_assignment(to: &str, name: &str, subject_title: &str, link: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "You have a new assignment".to_string(),
        html: format!(
            "<h2>Hello {name},</h2>\
             <p>You have been assigned to <strong>{subject_title}</strong>.</p>\
             <p><a href=\"{link}\">Open the assignment</a></p>"
        ),
    }
}

pub fn password_reset(to: &str, name: &str, reset_link: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Password reset request".to_string(),
        html: format!(
            "<h2>Hello {name},</h2>\
             <p>Use the link below to choose a new password. It expires in one hour.</p>\
             <p><a href=\"{reset_link}\">Reset password</a></p>\
             <p>If you did not ask for this, ignore this email.</p>"
        ),
    }
}

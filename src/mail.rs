use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MailConfig;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("mail provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<(), MailError>;
}

pub fn activation_email(client_url: &str, to: &str, token: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Account activation link".into(),
        html: format!(
            "<h1>Please use the following link to activate your account</h1>\
             <p>{client_url}/auth/activate/{token}</p>\
             <hr />\
             <p>This email may contain sensitive information</p>\
             <p>{client_url}</p>"
        ),
    }
}

pub fn reset_email(client_url: &str, to: &str, token: &str) -> Email {
    Email {
        to: to.to_string(),
        subject: "Password Reset Link".into(),
        html: format!(
            "<h1>Hi, we have received a request to reset your password. \
             If you did not make the request, just ignore this email. Otherwise, \
             you can reset your password using this link:</h1>\
             <p>{client_url}/auth/password/reset/{token}</p>\
             <p>This email may contain sensitive information</p>\
             <p>{client_url}</p>"
        ),
    }
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    value: &'a str,
}

/// Body of SendGrid's v3 `mail/send`.
#[derive(Debug, Serialize)]
struct SendGridPayload<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

impl<'a> SendGridPayload<'a> {
    fn new(from: &'a str, email: &'a Email) -> Self {
        Self {
            personalizations: vec![Personalization {
                to: vec![Address { email: &email.to }],
            }],
            from: Address { email: from },
            subject: &email.subject,
            content: vec![Content {
                kind: "text/html",
                value: &email.html,
            }],
        }
    }
}

#[derive(Clone)]
pub struct SendGridMailer {
    client: Client,
    api_key: String,
    from: String,
    endpoint: String,
}

impl SendGridMailer {
    pub fn new(client: Client, cfg: &MailConfig) -> Self {
        Self {
            client,
            api_key: cfg.sendgrid_api_key.clone(),
            from: cfg.from.clone(),
            endpoint: SENDGRID_ENDPOINT.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: Email) -> Result<(), MailError> {
        let res = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(30))
            .json(&SendGridPayload::new(&self.from, &email))
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            debug!(to = %email.to, subject = %email.subject, %status, "mail accepted");
            return Ok(());
        }
        let body = res.text().await.unwrap_or_default();
        warn!(to = %email.to, %status, "mail rejected by provider");
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
pub use recording::RecordingMailer;

#[cfg(test)]
mod recording {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use async_trait::async_trait;

    use super::{Email, MailError, Mailer};

    /// Keeps every sent email; can be switched to reject sends.
    #[derive(Default)]
    pub struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
        failing: AtomicBool,
    }

    impl RecordingMailer {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<Email> {
            self.sent.lock().unwrap().clone()
        }

        pub fn last_token(&self) -> Option<String> {
            self.sent().last().and_then(|mail| {
                let start = mail.html.find("/activate/").map(|i| i + "/activate/".len())
                    .or_else(|| mail.html.find("/reset/").map(|i| i + "/reset/".len()))?;
                let rest = &mail.html[start..];
                rest.find('<').map(|end| rest[..end].to_string())
            })
        }
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> Result<(), MailError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(MailError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }
}

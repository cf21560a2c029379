//! Email notifications for tasks.
//!
//! This module provides:
//! - The `Email` message composed from a task
//! - A `Notifier` trait abstracting how messages are delivered
//! - `SmtpNotifier`, delivering over SMTP with `lettre`

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::Config;
use crate::reminder::ReminderKind;
use crate::task::Task;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while sending an email.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// SMTP credentials are missing from the configuration.
    #[error("EMAIL_USER or EMAIL_PASS not set")]
    NotConfigured,
    /// The sender or recipient address could not be parsed.
    #[error("Invalid email address: {0}")]
    InvalidAddress(#[from] lettre::address::AddressError),
    /// The message could not be assembled.
    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),
    /// The SMTP exchange failed (connection, TLS, authentication, rejection).
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// A plain-text email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Email {
    /// Composes the reminder of `kind` for `task`.
    pub fn reminder(task: &Task, kind: ReminderKind, to: &str) -> Self {
        let subject = match kind {
            ReminderKind::Day => format!("Reminder: '{}' is due in ~1 day", task.title()),
            ReminderKind::Hour => format!("Urgent: '{}' is due in ~1 hour", task.title()),
        };
        let body = format!(
            "Task: {}\nDue: {}\n\n{}",
            task.title(),
            task.due_display(),
            task.description().unwrap_or_default()
        );
        Self {
            to: to.to_string(),
            subject,
            body,
        }
    }

    /// Composes the acknowledgement sent when a task is created.
    pub fn confirmation(task: &Task, to: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: format!("Task received: {}", task.title()),
            body: format!(
                "Your task '{}' has been created and is due on {}.\nYou will receive reminders 1 day and 1 hour before the deadline.",
                task.title(),
                task.due_display()
            ),
        }
    }
}

/// Picks the address reminders for `task` go to: the task's own address,
/// else the configured fallback.
pub fn resolve_recipient<'a>(task: &'a Task, fallback: Option<&'a str>) -> Option<&'a str> {
    task.notify_email()
        .map(str::trim)
        .filter(|address| !address.is_empty())
        .or(fallback)
}

/// Delivers emails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `email`. An error means the message was not delivered.
    async fn send(&self, email: &Email) -> Result<(), NotifyError>;
}

/// Notifier delivering through an SMTP relay.
///
/// Port 465 uses implicit TLS, ports 587 and 25 upgrade with STARTTLS and
/// any other port talks plaintext.
pub struct SmtpNotifier {
    sender: String,
    debug: bool,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpNotifier {
    /// Builds the notifier from the email settings of `config`.
    ///
    /// Without credentials the notifier is still created, but every send
    /// fails with `NotifyError::NotConfigured`.
    pub fn from_config(config: &Config) -> Result<Self, NotifyError> {
        let sender = config.sender();
        if !config.has_email_credentials() {
            tracing::warn!("EMAIL_USER or EMAIL_PASS not set, reminders cannot be sent");
            return Ok(Self {
                sender,
                debug: config.email_debug,
                transport: None,
            });
        }

        let builder = match config.email_port {
            465 => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.email_host)?,
            587 | 25 => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.email_host)?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.email_host),
        };
        let transport = builder
            .port(config.email_port)
            .credentials(Credentials::new(
                config.email_user.clone(),
                config.email_pass.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        tracing::info!(
            "SMTP notifier configured for {}:{}",
            config.email_host,
            config.email_port
        );
        Ok(Self {
            sender,
            debug: config.email_debug,
            transport: Some(transport),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }

    fn build_message(&self, email: &Email) -> Result<Message, NotifyError> {
        let message = Message::builder()
            .from(self.sender.parse::<Mailbox>()?)
            .to(email.to.parse::<Mailbox>()?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())?;
        Ok(message)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    #[tracing::instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &Email) -> Result<(), NotifyError> {
        let transport = self.transport.as_ref().ok_or(NotifyError::NotConfigured)?;
        let message = self.build_message(email)?;
        let response = transport.send(message).await?;

        if self.debug {
            tracing::info!(
                code = %response.code(),
                reply = ?response.message().collect::<Vec<_>>(),
                "SMTP exchange completed"
            );
        }
        tracing::info!("Sent to {}: {}", email.to, email.subject);
        Ok(())
    }
}

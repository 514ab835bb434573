//! Outgoing mail.
//!
//! Handlers never talk to a transport directly. They drop an [`EmailMessage`]
//! into the [`Outbox`] and move on; a worker owns the receiving end and does
//! the delivery, logging every failure.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

pub trait Mailer: Send + Sync {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Writes messages to the log instead of delivering them.
pub struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        info!(
            to = %message.to.join(", "),
            subject = %message.subject,
            body = %message.body,
            "mail (console)"
        );
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub struct SmtpMailer {
    transport: lettre::SmtpTransport,
}

#[cfg(not(target_arch = "wasm32"))]
impl SmtpMailer {
    pub fn new(smtp: &crate::config::SmtpConfig) -> anyhow::Result<Self> {
        use lettre::transport::smtp::authentication::Credentials;

        let mut builder = lettre::SmtpTransport::starttls_relay(&smtp.host)?.port(smtp.port);
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Mailer for SmtpMailer {
    fn send(&self, message: &EmailMessage) -> anyhow::Result<()> {
        use lettre::Transport;

        let mut email = lettre::Message::builder()
            .from(message.from.parse()?)
            .subject(message.subject.clone());
        for to in &message.to {
            email = email.to(to.parse()?);
        }
        let email = email.body(message.body.clone())?;

        self.transport.send(&email)?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn mailer_from_config(config: &crate::config::Config) -> anyhow::Result<Arc<dyn Mailer>> {
    Ok(match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => Arc::new(ConsoleMailer),
    })
}

#[derive(Clone)]
pub struct Outbox {
    tx: UnboundedSender<EmailMessage>,
}

impl Outbox {
    pub fn channel() -> (Self, UnboundedReceiver<EmailMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues a message. Never blocks and never reports delivery.
    pub fn dispatch(&self, message: EmailMessage) {
        if let Err(err) = self.tx.send(message) {
            warn!(to = %err.0.to.join(", "), "mail worker is gone, message dropped");
        }
    }
}

/// Delivers everything currently queued, returning how many were sent.
pub fn flush(rx: &mut UnboundedReceiver<EmailMessage>, mailer: &dyn Mailer) -> usize {
    let mut sent = 0;
    loop {
        match rx.try_recv() {
            Ok(message) => match mailer.send(&message) {
                Ok(()) => sent += 1,
                Err(e) => warn!(error = %e, subject = %message.subject, "mail delivery failed"),
            },
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return sent,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn run_worker(mut rx: UnboundedReceiver<EmailMessage>, mailer: Arc<dyn Mailer>) {
    info!("mail worker started");
    while let Some(message) = rx.recv().await {
        let mailer = mailer.clone();
        let subject = message.subject.clone();
        match tokio::task::spawn_blocking(move || mailer.send(&message)).await {
            Ok(Ok(())) => info!(%subject, "mail delivered"),
            Ok(Err(e)) => warn!(error = %e, %subject, "mail delivery failed"),
            Err(e) => tracing::error!(error = %e, %subject, "mail task panicked"),
        }
    }
    info!("mail worker stopped");
}

use crate::errors::NotifyError;
use crate::metrics::{ALERTS_SENT_TOTAL, ALERTS_SUPPRESSED_TOTAL};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

pub const ALERT_SUBJECT: &str = "Telemetry poller alert";

/// Delivers a single alert message.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub recipient: String,
}

/// SMTP submission over implicit TLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, NotifyError> {
        let to: Mailbox = settings.recipient.parse()?;
        // Logins are not always addresses; send as the recipient then.
        let from = settings.username.parse::<Mailbox>().unwrap_or_else(|_| to.clone());
        let credentials = Credentials::new(settings.username.clone(), settings.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.host)?
            .port(settings.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from,
            to,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(email).await?;
        Ok(())
    }
}

/// Categories already alerted on during this process lifetime.
///
/// Clones share the same set. It only grows.
#[derive(Debug, Clone, Default)]
pub struct SentAlerts {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl SentAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `category`; returns `false` if it was already there.
    pub fn mark(&self, category: &str) -> bool {
        let mut sent = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sent.insert(category.to_string())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(category)
    }
}

/// Sends at most one email per failure category.
pub struct AlertNotifier {
    mailer: Arc<dyn Mailer>,
    sent: SentAlerts,
}

impl AlertNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, sent: SentAlerts) -> Self {
        Self { mailer, sent }
    }

    /// Best effort. Delivery failures are logged and swallowed; the category
    /// stays marked either way.
    pub async fn notify_once(&self, category: &str, message: &str) {
        if !self.sent.mark(category) {
            ALERTS_SUPPRESSED_TOTAL.inc();
            info!("Alert for '{}' already sent, suppressing", category);
            return;
        }

        let body = format!("Message: {}", message);
        match self.mailer.send(ALERT_SUBJECT, &body).await {
            Ok(()) => {
                ALERTS_SENT_TOTAL.inc();
                info!("Alert email sent for '{}'", category);
            }
            Err(e) => error!("Failed to send alert email for '{}': {}", category, e),
        }
    }
}

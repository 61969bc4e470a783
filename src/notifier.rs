use crate::config::SmtpConfig;
use crate::error::CrawlError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// What the operator is told when a challenge blocks the crawl
#[derive(Debug, Clone)]
pub struct ChallengeContext {
    pub feed_url: String,
    pub pages_processed: u64,
    pub links_collected: usize,
    pub detected_at: DateTime<Utc>,
}

impl ChallengeContext {
    pub fn subject(&self) -> String {
        "Report harvester paused due to bot verification".to_string()
    }

    pub fn body(&self) -> String {
        format!(
            "Hello,\n\n\
             The report harvester has encountered a bot/anti-automation challenge at {} and is \
             waiting for manual intervention. Please open the browser window and complete the \
             verification; the crawl will resume automatically.\n\n\
             Detected at: {}\n\
             Pages processed so far: {}\n\
             Report links collected so far: {}\n\n\
             This message was generated automatically.",
            self.feed_url,
            self.detected_at.to_rfc3339(),
            self.pages_processed,
            self.links_collected
        )
    }
}

/// Out-of-band alert channel. Delivery is best effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, context: &ChallengeContext) -> Result<(), CrawlError>;
}

/// Used when no alert channel is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, context: &ChallengeContext) -> Result<(), CrawlError> {
        ::log::warn!(
            "Bot challenge at {}: email notification skipped, SMTP host/from/to not fully configured. \
             Complete the verification in the browser window to continue",
            context.feed_url
        );
        Ok(())
    }
}

/// Sends alerts through an SMTP relay
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, CrawlError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| CrawlError::Config(format!("invalid email address {address:?}: {e}")))
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, CrawlError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| CrawlError::Config("SMTP host is required".into()))?;
        let from = parse_mailbox(config.from.as_deref().unwrap_or_default())?;
        let to = config
            .recipients()
            .iter()
            .map(|r| parse_mailbox(r))
            .collect::<Result<Vec<_>, _>>()?;

        let builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                .map_err(|e| CrawlError::Config(format!("SMTP relay {host}: {e}")))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };
        let mut builder = builder.port(config.port).timeout(Some(SMTP_TIMEOUT));
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, context: &ChallengeContext) -> Result<Message, CrawlError> {
        if self.to.is_empty() {
            return Err(CrawlError::Notification(
                "no valid SMTP recipients resolved".into(),
            ));
        }

        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(context.subject())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(context.body())
            .map_err(|e| CrawlError::Notification(e.to_string()))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, context: &ChallengeContext) -> Result<(), CrawlError> {
        let message = self.message(context)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| CrawlError::Notification(e.to_string()))?;
        ::log::info!(
            "Bot challenge notification sent to {} recipient(s)",
            self.to.len()
        );
        Ok(())
    }
}

/// Pick the alert channel for a run
pub fn from_config(smtp: Option<&SmtpConfig>) -> Box<dyn Notifier> {
    match smtp {
        Some(config) if config.is_complete() => match SmtpNotifier::new(config) {
            Ok(notifier) => Box::new(notifier),
            Err(e) => {
                ::log::warn!("Email notifications disabled: {}", e);
                Box::new(LogNotifier)
            }
        },
        _ => Box::new(LogNotifier),
    }
}

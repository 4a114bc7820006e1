//! Outbound notifications for downstream monitoring.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{ExecError, Result};

/// Notification urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A single outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    /// Originating component, e.g. `fleet-build`
    pub source: String,
}

impl Notification {
    pub fn critical(title: impl Into<String>, body: impl Into<String>) -> Self {
        Notification {
            title: title.into(),
            body: body.into(),
            priority: Priority::Critical,
            source: "fleet-build".to_string(),
        }
    }
}

/// Capability to deliver a notification.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log only. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        match n.priority {
            Priority::Critical | Priority::High => {
                error!(priority = %n.priority, source = %n.source, title = %n.title, "{}", n.body)
            }
            Priority::Normal => {
                warn!(priority = %n.priority, source = %n.source, title = %n.title, "{}", n.body)
            }
            Priority::Low => {
                info!(priority = %n.priority, source = %n.source, title = %n.title, "{}", n.body)
            }
        }
        Ok(())
    }
}

/// POSTs the notification as JSON to a webhook.
pub struct WebhookNotifier {
    url: String,
    http_client: reqwest::Client,
}

impl WebhookNotifier {
    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("fleet-exec/", env!("CARGO_PKG_VERSION")))
            .timeout(Self::TIMEOUT)
            .build()?;
        Ok(WebhookNotifier {
            url: url.into(),
            http_client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, n: &Notification) -> Result<()> {
        let response = self.http_client.post(&self.url).json(n).send().await?;
        if !response.status().is_success() {
            return Err(ExecError::Http(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        info!(url = %self.url, title = %n.title, "notification delivered");
        Ok(())
    }
}

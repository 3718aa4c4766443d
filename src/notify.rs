//! Notification gateway - tells deliverymen when a package is waiting for them

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Deliveryman;

/// A message addressed to one person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// The "ready for pickup" message sent when a delivery is created
    pub fn ready_for_pickup(deliveryman: &Deliveryman, product: &str) -> Self {
        Self {
            to: format!("{} <{}>", deliveryman.name, deliveryman.email),
            subject: format!("{} ready for pickup!", product),
            body: format!(
                "{} is ready to be picked up by you at the carrier!",
                product
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Body posted to the mail relay
#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

/// Mail relay client: hands messages to an HTTP mail service
pub struct HttpMailer {
    client: Client,
    base_url: String,
    from: String,
}

impl HttpMailer {
    pub fn new(base_url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Notifier for HttpMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .json(&RelayMessage {
                from: &self.from,
                to: &notification.to,
                subject: &notification.subject,
                text: &notification.body,
            })
            .send()
            .await
            .map_err(|e| AppError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Notification(format!(
                "Failed to send mail: {} - {}",
                status, text
            )));
        }

        tracing::debug!(to = %notification.to, "Mail handed to relay");
        Ok(())
    }
}

/// Writes notifications to the log instead of sending them
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification (no mail relay configured)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_ready_for_pickup_message() {
        let deliveryman = Deliveryman {
            id: 2,
            name: "Bruno".to_string(),
            email: "bruno@fastfeet.com".to_string(),
            avatar_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let n = Notification::ready_for_pickup(&deliveryman, "Widget");
        assert_eq!(n.to, "Bruno <bruno@fastfeet.com>");
        assert!(n.subject.contains("Widget"));
        assert!(n.body.starts_with("Widget"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let n = Notification {
            to: "a@b.c".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };
        assert!(LogNotifier.send(&n).await.is_ok());
    }
}

//! Webhook alert delivery.
//!
//! POSTs a Discord-compatible embed to the URL held in the notification's
//! delivery target. One attempt per notification; the scheduler logs
//! failures and the next tick re-evaluates.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::{render_alert, Notification, Notifier};
use crate::error::NotifyError;

const EMBED_COLOR_GOLD: u32 = 0xF1C40F;

#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    content: Option<String>,
    embeds: Vec<WebhookEmbed>,
}

#[derive(Debug, Serialize)]
struct WebhookEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    fn payload(notification: &Notification) -> WebhookPayload {
        let message = render_alert(notification);
        WebhookPayload {
            content: None,
            embeds: vec![WebhookEmbed {
                title: message.title,
                description: message.lines.join("\n"),
                color: EMBED_COLOR_GOLD,
                timestamp: notification.triggered_at.to_rfc3339(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = notification.delivery_target.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config {
                message: format!("delivery target '{}' is not a webhook URL", url),
            });
        }

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&Self::payload(notification))
            .send()
            .await
            .map_err(|err| NotifyError::Transport { message: err.to_string() })?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected { status: response.status().as_u16() });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

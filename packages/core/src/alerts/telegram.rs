//! Telegram Bot API delivery; the delivery target is the chat id.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::alerts::{render_alert, Notification, Notifier};
use crate::error::NotifyError;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

#[derive(Clone)]
pub struct TelegramNotifier {
    api_base: String,
    token: String,
    client: Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, token, timeout)
    }

    pub fn with_api_base(api_base: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.token);
        let body = SendMessage {
            chat_id: &notification.delivery_target,
            text: render_alert(notification).to_text(),
        };

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            // The URL embeds the bot token; keep it out of logs.
            .map_err(|err| NotifyError::Transport { message: err.without_url().to_string() })?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected { status: response.status().as_u16() });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

//! Alert delivery.
//!
//! The engine produces [`Notification`]s; something implementing
//! [`Notifier`] turns each one into a message on a concrete channel. The
//! scheduler puts a [`DeliveryGate`] in front of the notifier to apply the
//! configured [`RepeatPolicy`].

pub mod log;
pub mod policy;
pub mod telegram;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::NotifyError;
use crate::fares::Fare;
use crate::store::Subscription;

pub use self::log::LogNotifier;
pub use policy::{DeliveryGate, RepeatPolicy};
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

/// A subscription whose target is met by the current lowest fare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subscriber_id: String,
    pub delivery_target: String,
    pub target_price: Decimal,
    pub matched_fare: Fare,
    pub triggered_at: DateTime<Utc>,
    /// `created_at` of the subscription that produced this notification.
    pub subscribed_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(subscription: &Subscription, fare: &Fare, triggered_at: DateTime<Utc>) -> Self {
        Self {
            subscriber_id: subscription.subscriber_id.clone(),
            delivery_target: subscription.delivery_target.clone(),
            target_price: subscription.target_price,
            matched_fare: fare.clone(),
            triggered_at,
            subscribed_at: subscription.created_at,
        }
    }
}

/// Delivery channel for notifications (one implementation per front-end).
#[async_trait]
pub trait Notifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Channel-neutral alert text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub title: String,
    pub lines: Vec<String>,
}

impl AlertMessage {
    pub fn to_text(&self) -> String {
        let mut text = self.title.clone();
        for line in &self.lines {
            text.push('\n');
            text.push_str(line);
        }
        text
    }
}

pub fn render_alert(notification: &Notification) -> AlertMessage {
    let fare = &notification.matched_fare;
    let time = |t: Option<chrono::NaiveTime>| {
        t.map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "N/A".to_string())
    };

    AlertMessage {
        title: "PRICE ALERT! Target reached".to_string(),
        lines: vec![
            format!("Target: <= {:.2} {}", notification.target_price, fare.currency),
            format!("Current: {:.2} {}", fare.price, fare.currency),
            format!("Date: {} ({})", fare.date.format("%Y-%m-%d"), fare.date.format("%A")),
            format!(
                "Time: {} -> {}",
                time(fare.departure_time),
                time(fare.arrival_time)
            ),
        ],
    }
}

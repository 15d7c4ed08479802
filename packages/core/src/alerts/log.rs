use async_trait::async_trait;

use crate::alerts::{render_alert, Notification, Notifier};
use crate::error::NotifyError;

/// Writes alerts to the log. Used by the CLI and when no channel is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let message = render_alert(notification);
        tracing::info!(
            subscriber = %notification.subscriber_id,
            delivery_target = %notification.delivery_target,
            "{} | {}",
            message.title,
            message.lines.join(" | ")
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

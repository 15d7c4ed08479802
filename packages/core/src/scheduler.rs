//! Alert polling scheduler.
//!
//! Drives the main loop: each tick asks the engine for a fresh evaluation
//! and hands the resulting notifications to the notifier, through the
//! repeat-policy gate. Ticks run inline, so they never overlap.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::{self, MissedTickBehavior};

use crate::alerts::{DeliveryGate, Notification, Notifier};
use crate::engine::AlertEngine;
use crate::metrics::AppMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub period: Duration,
    /// Pause between readiness and the first tick.
    pub first_tick_delay: Duration,
}

/// What happened to one batch of notifications.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
    /// Dropped because the subscriber changed or left after evaluation.
    pub stale: usize,
}

/// Run the alert loop.
///
/// Waits for `ready`, then `first_tick_delay`, then ticks every `period`.
/// A slow tick skips the periods it overran instead of queueing them.
/// Fetch and delivery errors are logged and the loop continues.
///
/// Returns once `shutdown` resolves. Shutdown is only observed between
/// ticks; an in-flight tick and its delivery batch always finish.
pub async fn run_alert_loop<R, S>(
    engine: Arc<AlertEngine>,
    notifier: Arc<dyn Notifier + Send + Sync>,
    mut gate: DeliveryGate,
    metrics: Option<Arc<AppMetrics>>,
    settings: ScheduleSettings,
    ready: R,
    shutdown: S,
) where
    R: Future<Output = ()>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let warm_up = async {
        ready.await;
        time::sleep(settings.first_tick_delay).await;
    };
    tokio::select! {
        _ = &mut shutdown => {
            tracing::info!("Shutdown requested before the first tick");
            return;
        }
        _ = warm_up => {}
    }

    let mut interval = time::interval(settings.period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        "Alert polling started (interval: {}s, notifier: {}, repeat: {:?})",
        settings.period.as_secs(),
        notifier.name(),
        gate.policy()
    );

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received. Stopping polling.");
                break;
            }

            _ = interval.tick() => {
                let outcome = engine.tick().await;
                if let Some(err) = &outcome.fetch_error {
                    tracing::error!("Fare polling error, evaluated cached fares: {}", err);
                }
                let summary = dispatch(
                    &engine,
                    notifier.as_ref(),
                    &mut gate,
                    metrics.as_deref(),
                    outcome.notifications,
                )
                .await;
                if summary != DispatchSummary::default() {
                    tracing::info!(
                        "Tick done: {} sent, {} failed, {} suppressed, {} stale",
                        summary.sent,
                        summary.failed,
                        summary.suppressed,
                        summary.stale
                    );
                }
            }
        }
    }

    tracing::info!("Alert polling stopped cleanly");
}

/// Deliver one tick's notifications. Failures are not retried here; the
/// next tick re-evaluates and tries again.
///
/// A notification is only delivered while the subscription it was built
/// from is still the subscriber's current, active one.
pub async fn dispatch(
    engine: &AlertEngine,
    notifier: &(dyn Notifier + Send + Sync),
    gate: &mut DeliveryGate,
    metrics: Option<&AppMetrics>,
    notifications: Vec<Notification>,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    let store = engine.store();

    for notification in notifications {
        let current = store
            .get(&notification.subscriber_id)
            .await
            .map_or(false, |sub| {
                sub.active && sub.created_at == notification.subscribed_at
            });
        if !current {
            summary.stale += 1;
            tracing::debug!(
                "Dropped alert for {}: subscription changed since evaluation",
                notification.subscriber_id
            );
            continue;
        }

        let now = Utc::now();
        if !gate.should_deliver(&notification, now) {
            summary.suppressed += 1;
            if let Some(metrics) = metrics {
                metrics.notifications_suppressed_total.inc();
            }
            tracing::debug!(
                "Suppressed repeat alert for {}",
                notification.subscriber_id
            );
            continue;
        }

        match notifier.notify(&notification).await {
            Ok(()) => {
                gate.record_delivery(&notification, now);
                summary.sent += 1;
                if let Some(metrics) = metrics {
                    metrics.notifications_sent_total.inc();
                }
                tracing::info!(
                    "Alerted {} via {}: {} {} on {}",
                    notification.subscriber_id,
                    notifier.name(),
                    notification.matched_fare.price,
                    notification.matched_fare.currency,
                    notification.matched_fare.date
                );

                if gate.policy().deactivates_after_delivery() {
                    // On failure the gate still blocks this subscriber until restart.
                    if let Err(err) = store
                        .unsubscribe_if_current(
                            &notification.subscriber_id,
                            notification.subscribed_at,
                        )
                        .await
                    {
                        tracing::warn!(
                            "Could not deactivate {} after one-shot alert: {}",
                            notification.subscriber_id,
                            err
                        );
                    }
                }
            }
            Err(err) => {
                summary.failed += 1;
                if let Some(metrics) = metrics {
                    metrics.notification_failures_total.inc();
                }
                tracing::warn!(
                    "{} notifier failed for {}: {}",
                    notifier.name(),
                    notification.subscriber_id,
                    err
                );
            }
        }
    }

    summary
}

//! Alert engine.
//!
//! Owns the fetch-evaluate cycle: each [`AlertEngine::tick`] refreshes the
//! fare cache from the source and reports every active subscription whose
//! target the current lowest fare meets. Delivery is the caller's job.
//!
//! The engine is also the query/command surface shared by the HTTP API and
//! the CLI, so every front-end reads the same cache and store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::alerts::Notification;
use crate::cache::{FareCache, FareSnapshot, FareStats};
use crate::error::{FetchError, InvalidInputError, PersistenceError, SubscriptionError};
use crate::fares::{Fare, FareSet, FareSource, FareWindow};
use crate::metrics::AppMetrics;
use crate::store::{Subscription, SubscriptionStore};

/// Longest lookahead the engine accepts.
pub const MAX_LOOKAHEAD_DAYS: u32 = 365;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// How often a failed fetch is retried within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before attempt `failed_attempt + 1`: exponential in the number
    /// of failures, capped, plus up to 50% random jitter.
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF);
        let max_jitter_ms = (base.as_millis() / 2) as u64;
        let jitter_ms = if max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter_ms)
        };
        base + Duration::from_millis(jitter_ms)
    }
}

/// Result of one poll cycle.
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// One entry per active subscription met by the current lowest fare.
    pub notifications: Vec<Notification>,
    /// Set when the fetch failed and evaluation ran against the stale cache.
    pub fetch_error: Option<FetchError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscribeReceipt {
    pub subscription: Subscription,
    pub current_lowest: Option<Fare>,
    /// The current lowest fare already meets the new target.
    pub already_at_target: bool,
}

/// Where a subscriber stands against the current lowest fare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub subscription: Subscription,
    pub current_lowest: Option<Fare>,
    pub reached: bool,
    /// How far the lowest fare is above target; zero once reached.
    pub remaining: Option<Decimal>,
}

pub struct AlertEngine {
    source: Arc<dyn FareSource + Send + Sync>,
    cache: Arc<RwLock<FareCache>>,
    store: Arc<SubscriptionStore>,
    lookahead_days: u32,
    retry: RetryPolicy,
    metrics: Option<Arc<AppMetrics>>,
}

impl AlertEngine {
    pub fn new(
        source: Arc<dyn FareSource + Send + Sync>,
        cache: Arc<RwLock<FareCache>>,
        store: Arc<SubscriptionStore>,
        lookahead_days: u32,
    ) -> Result<Self, InvalidInputError> {
        if lookahead_days == 0 || lookahead_days > MAX_LOOKAHEAD_DAYS {
            return Err(InvalidInputError::new(
                "lookahead_days",
                format!("must be between 1 and {}, got {}", MAX_LOOKAHEAD_DAYS, lookahead_days),
            ));
        }

        Ok(Self {
            source,
            cache,
            store,
            lookahead_days,
            retry: RetryPolicy::default(),
            metrics: None,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<AppMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cache(&self) -> Arc<RwLock<FareCache>> {
        self.cache.clone()
    }

    pub fn store(&self) -> Arc<SubscriptionStore> {
        self.store.clone()
    }

    pub fn lookahead_days(&self) -> u32 {
        self.lookahead_days
    }

    pub fn provider_name(&self) -> &str {
        self.source.provider_name()
    }

    /// Refresh the cache, then evaluate every active subscription.
    ///
    /// A fetch failure is reported in the outcome and evaluation still runs
    /// against whatever snapshot the cache already holds.
    pub async fn tick(&self) -> TickOutcome {
        let fetch_error = match self.refresh().await {
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(
                    "Fare refresh from {} failed, evaluating cached fares: {}",
                    self.source.provider_name(),
                    err
                );
                Some(err)
            }
        };

        let notifications = self.evaluate(Utc::now()).await;
        if !notifications.is_empty() {
            tracing::info!("{} subscriptions met their target", notifications.len());
        }

        TickOutcome {
            notifications,
            fetch_error,
        }
    }

    /// Fetch the lookahead window starting today and replace the cache.
    pub async fn refresh(&self) -> Result<Arc<FareSnapshot>, FetchError> {
        let window = FareWindow::new(Utc::now().date_naive(), self.lookahead_days)?;
        if let Some(metrics) = &self.metrics {
            metrics.polls_total.inc();
        }

        let set = match self.fetch_window(window).await {
            Ok(set) => set,
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.poll_errors_total.inc();
                }
                return Err(err);
            }
        };

        let snapshot = self.cache.write().await.update(set);
        self.record_snapshot(&snapshot);

        match snapshot.lowest() {
            Some(lowest) => tracing::info!(
                "Cached {} fares ({} to {}), lowest {} {} on {}",
                snapshot.fares().len(),
                window.start(),
                window.end(),
                lowest.price,
                lowest.currency,
                lowest.date
            ),
            None => tracing::info!(
                "Cached {} fares ({} to {}), none available",
                snapshot.fares().len(),
                window.start(),
                window.end()
            ),
        }
        Ok(snapshot)
    }

    /// Fetch an arbitrary window with the retry policy. Does not touch the cache.
    pub async fn fetch_window(&self, window: FareWindow) -> Result<FareSet, FetchError> {
        let mut attempt = 1;
        loop {
            match self.source.fetch(window).await {
                Ok(set) => return Ok(set),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        "Fetch attempt {}/{} from {} failed: {}. Retrying in {}ms",
                        attempt,
                        self.retry.max_attempts,
                        self.source.provider_name(),
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetch `days` days starting at `start`.
    pub async fn fetch_range(&self, start: NaiveDate, days: u32) -> Result<FareSet, FetchError> {
        let window = FareWindow::new(start, days)?;
        self.fetch_window(window).await
    }

    async fn evaluate(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let lowest = self.cache.read().await.lowest();
        let active = self.store.active_all().await;
        if let Some(metrics) = &self.metrics {
            metrics.active_subscriptions.set(active.len() as f64);
        }

        let Some(lowest) = lowest else {
            tracing::debug!("No lowest fare known, skipping evaluation");
            return Vec::new();
        };

        active
            .iter()
            .filter(|subscription| subscription.is_met_by(&lowest))
            .map(|subscription| Notification::new(subscription, &lowest, now))
            .collect()
    }

    fn record_snapshot(&self, snapshot: &FareSnapshot) {
        if let Some(metrics) = &self.metrics {
            metrics.fares_cached.set(snapshot.fares().len() as f64);
            let lowest = snapshot
                .lowest()
                .and_then(|fare| fare.price.to_f64())
                .unwrap_or(0.0);
            metrics.lowest_price.set(lowest);
        }
    }

    /// Current lowest fare and when it was fetched.
    pub async fn query_lowest(&self) -> Option<(Fare, DateTime<Utc>)> {
        let snapshot = self.cache.read().await.snapshot()?;
        let lowest = snapshot.lowest()?.clone();
        Some((lowest, snapshot.fetched_at()))
    }

    pub async fn query_all(&self, limit: usize, price_ceiling: Option<Decimal>) -> Vec<Fare> {
        match self.cache.read().await.snapshot() {
            Some(snapshot) => snapshot.cheapest(limit, price_ceiling),
            None => Vec::new(),
        }
    }

    pub async fn query_stats(&self) -> Option<FareStats> {
        self.cache.read().await.snapshot()?.stats()
    }

    pub async fn snapshot(&self) -> Option<Arc<FareSnapshot>> {
        self.cache.read().await.snapshot()
    }

    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        target_price: Decimal,
        delivery_target: &str,
    ) -> Result<SubscribeReceipt, SubscriptionError> {
        let subscription = self
            .store
            .subscribe(subscriber_id, target_price, delivery_target)
            .await?;
        let current_lowest = self.cache.read().await.lowest();
        let already_at_target = current_lowest
            .as_ref()
            .map_or(false, |fare| subscription.is_met_by(fare));

        Ok(SubscribeReceipt {
            subscription,
            current_lowest,
            already_at_target,
        })
    }

    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<bool, PersistenceError> {
        self.store.unsubscribe(subscriber_id).await
    }

    pub async fn subscription_status(&self, subscriber_id: &str) -> Option<SubscriptionStatus> {
        let subscription = self.store.get(subscriber_id).await?;
        let current_lowest = self.cache.read().await.lowest();

        let reached = current_lowest
            .as_ref()
            .map_or(false, |fare| subscription.is_met_by(fare));
        let remaining = current_lowest
            .as_ref()
            .map(|fare| (fare.price - subscription.target_price).max(Decimal::ZERO));

        Some(SubscriptionStatus {
            subscription,
            current_lowest,
            reached,
            remaining,
        })
    }
}

//! Prometheus metrics registry for the fare watcher.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the engine, the scheduler and the HTTP router.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`).

use prometheus::{Counter, Gauge, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// Cache refreshes (success + failure). Retries within one refresh count once.
    pub polls_total: Counter,
    /// Ticks or refreshes whose fetch failed after all retries.
    pub poll_errors_total: Counter,
    /// Fares held in the latest cached snapshot.
    pub fares_cached: Gauge,
    /// Lowest available price in the cache; 0 while none is known.
    pub lowest_price: Gauge,
    /// Active subscriptions at the last tick.
    pub active_subscriptions: Gauge,
    pub notifications_sent_total: Counter,
    pub notification_failures_total: Counter,
    /// Notifications held back by the repeat policy.
    pub notifications_suppressed_total: Counter,
    /// The registry that owns all of the above metrics.
    pub registry: Registry,
}

impl AppMetrics {
    /// Create and register all metrics. Fails only on an invalid or
    /// duplicated metric name.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let polls_total = Counter::with_opts(Opts::new(
            "fare_watch_polls_total",
            "Total fare cache refreshes",
        ))?;

        let poll_errors_total = Counter::with_opts(Opts::new(
            "fare_watch_poll_errors_total",
            "Fare fetches that failed after retries",
        ))?;

        let fares_cached = Gauge::with_opts(Opts::new(
            "fare_watch_fares_cached",
            "Fares in the current cached snapshot",
        ))?;

        let lowest_price = Gauge::with_opts(Opts::new(
            "fare_watch_lowest_price",
            "Lowest available fare price in the cache",
        ))?;

        let active_subscriptions = Gauge::with_opts(Opts::new(
            "fare_watch_active_subscriptions",
            "Active price alert subscriptions",
        ))?;

        let notifications_sent_total = Counter::with_opts(Opts::new(
            "fare_watch_notifications_sent_total",
            "Alerts delivered successfully",
        ))?;

        let notification_failures_total = Counter::with_opts(Opts::new(
            "fare_watch_notification_failures_total",
            "Alerts the notifier failed to deliver",
        ))?;

        let notifications_suppressed_total = Counter::with_opts(Opts::new(
            "fare_watch_notifications_suppressed_total",
            "Alerts suppressed by the repeat policy",
        ))?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_errors_total.clone()))?;
        registry.register(Box::new(fares_cached.clone()))?;
        registry.register(Box::new(lowest_price.clone()))?;
        registry.register(Box::new(active_subscriptions.clone()))?;
        registry.register(Box::new(notifications_sent_total.clone()))?;
        registry.register(Box::new(notification_failures_total.clone()))?;
        registry.register(Box::new(notifications_suppressed_total.clone()))?;

        Ok(Self {
            polls_total,
            poll_errors_total,
            fares_cached,
            lowest_price,
            active_subscriptions,
            notifications_sent_total,
            notification_failures_total,
            notifications_suppressed_total,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

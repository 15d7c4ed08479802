//! Repeat policy for alert delivery.
//!
//! The engine reports every met subscription on every tick. The gate decides
//! whether a given notification actually goes out, based on when the same
//! subscriber was last notified.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};

use crate::alerts::Notification;
use crate::error::InvalidInputError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Deliver on every tick while the target is met.
    Always,
    /// Deliver once, then the scheduler deactivates the subscription.
    Once,
    /// Deliver at most once per window per subscriber.
    Cooldown(Duration),
}

impl RepeatPolicy {
    /// Parse `always`, `once` or `cooldown`; the cooldown window is supplied
    /// separately because it comes from its own setting.
    pub fn parse(value: &str, cooldown: Duration) -> Result<Self, InvalidInputError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(RepeatPolicy::Always),
            "once" => Ok(RepeatPolicy::Once),
            "cooldown" => {
                if cooldown <= Duration::zero() {
                    return Err(InvalidInputError::new(
                        "alert_cooldown",
                        "cooldown must be greater than zero",
                    ));
                }
                Ok(RepeatPolicy::Cooldown(cooldown))
            }
            other => Err(InvalidInputError::new(
                "alert_repeat",
                format!("unknown repeat policy '{}'", other),
            )),
        }
    }

    pub fn deactivates_after_delivery(&self) -> bool {
        matches!(self, RepeatPolicy::Once)
    }
}

impl FromStr for RepeatPolicy {
    type Err = InvalidInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RepeatPolicy::parse(s, Duration::hours(6))
    }
}

/// Tracks successful deliveries per subscriber. Lives in the scheduler
/// task; not persisted.
#[derive(Debug)]
pub struct DeliveryGate {
    policy: RepeatPolicy,
    last_delivered: HashMap<String, DateTime<Utc>>,
}

impl DeliveryGate {
    pub fn new(policy: RepeatPolicy) -> Self {
        Self {
            policy,
            last_delivered: HashMap::new(),
        }
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    pub fn should_deliver(&self, notification: &Notification, now: DateTime<Utc>) -> bool {
        // A delivery made before the current subscription was created
        // belongs to an earlier subscription and does not count.
        let last = self
            .last_delivered
            .get(&notification.subscriber_id)
            .filter(|delivered| **delivered >= notification.subscribed_at);

        match (self.policy, last) {
            (RepeatPolicy::Always, _) => true,
            (_, None) => true,
            (RepeatPolicy::Once, Some(_)) => false,
            (RepeatPolicy::Cooldown(window), Some(delivered)) => now - *delivered >= window,
        }
    }

    pub fn record_delivery(&mut self, notification: &Notification, now: DateTime<Utc>) {
        self.last_delivered
            .insert(notification.subscriber_id.clone(), now);
    }

    pub fn last_delivery(&self, subscriber_id: &str) -> Option<DateTime<Utc>> {
        self.last_delivered.get(subscriber_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::test_support::notification;

    #[test]
    fn parse_accepts_known_policies() {
        let window = Duration::minutes(30);
        assert_eq!(RepeatPolicy::parse("always", window).unwrap(), RepeatPolicy::Always);
        assert_eq!(RepeatPolicy::parse(" ONCE ", window).unwrap(), RepeatPolicy::Once);
        assert_eq!(
            RepeatPolicy::parse("cooldown", window).unwrap(),
            RepeatPolicy::Cooldown(window)
        );
        assert_eq!("once".parse::<RepeatPolicy>().unwrap(), RepeatPolicy::Once);
    }

    #[test]
    fn parse_rejects_unknown_and_zero_cooldown() {
        assert_eq!(
            RepeatPolicy::parse("sometimes", Duration::minutes(1)).unwrap_err().field,
            "alert_repeat"
        );
        assert_eq!(
            RepeatPolicy::parse("cooldown", Duration::zero()).unwrap_err().field,
            "alert_cooldown"
        );
    }

    #[test]
    fn always_delivers_every_time() {
        let mut gate = DeliveryGate::new(RepeatPolicy::Always);
        let n = notification("chat");
        let now = Utc::now();
        gate.record_delivery(&n, now);
        assert!(gate.should_deliver(&n, now));
    }

    #[test]
    fn once_blocks_after_first_delivery() {
        let mut gate = DeliveryGate::new(RepeatPolicy::Once);
        let n = notification("chat");
        let now = n.subscribed_at + Duration::seconds(1);

        assert!(gate.should_deliver(&n, now));
        gate.record_delivery(&n, now);
        assert!(!gate.should_deliver(&n, now + Duration::days(1)));
        assert!(gate.policy().deactivates_after_delivery());
    }

    #[test]
    fn once_allows_again_after_resubscribe() {
        let mut gate = DeliveryGate::new(RepeatPolicy::Once);
        let mut n = notification("chat");
        let now = n.subscribed_at + Duration::seconds(1);
        gate.record_delivery(&n, now);

        n.subscribed_at = now + Duration::seconds(5);
        assert!(gate.should_deliver(&n, now + Duration::seconds(10)));
    }

    #[test]
    fn cooldown_waits_for_window() {
        let mut gate = DeliveryGate::new(RepeatPolicy::Cooldown(Duration::minutes(60)));
        let n = notification("chat");
        let first = n.subscribed_at + Duration::seconds(1);
        gate.record_delivery(&n, first);

        assert!(!gate.should_deliver(&n, first + Duration::minutes(30)));
        assert!(gate.should_deliver(&n, first + Duration::minutes(60)));
        assert_eq!(gate.last_delivery("alice"), Some(first));
    }

    #[test]
    fn cooldown_resets_on_resubscribe() {
        let mut gate = DeliveryGate::new(RepeatPolicy::Cooldown(Duration::minutes(60)));
        let mut n = notification("chat");
        let first = n.subscribed_at + Duration::seconds(1);
        gate.record_delivery(&n, first);

        n.subscribed_at = first + Duration::minutes(5);
        assert!(gate.should_deliver(&n, first + Duration::minutes(6)));
    }
}

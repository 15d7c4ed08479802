//! Subscription store.
//!
//! `SubscriptionStore` keeps the last committed set of subscriptions in
//! memory and writes through a [`SubscriptionRepository`]. Every mutation
//! follows the same order:
//!
//! 1. take the writer mutex (the only mutual-exclusion point),
//! 2. make the change durable in the repository,
//! 3. swap in a new committed map.
//!
//! If step 2 fails the committed map is untouched, so memory never runs
//! ahead of disk. Readers clone the committed `Arc` and never wait on a
//! write in progress.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::{InvalidInputError, PersistenceError, SubscriptionError};
use crate::fares::Fare;
use crate::repository::SubscriptionRepository;

/// One subscriber's price alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscriber_id: String,
    pub target_price: Decimal,
    /// Opaque to the engine; only the notifier interprets it.
    pub delivery_target: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// `true` when this subscription is active and `fare` meets its target.
    pub fn is_met_by(&self, fare: &Fare) -> bool {
        self.active && fare.price <= self.target_price
    }
}

type SubscriptionMap = HashMap<String, Subscription>;

pub struct SubscriptionStore {
    repository: Arc<dyn SubscriptionRepository + Send + Sync>,
    committed: RwLock<Arc<SubscriptionMap>>,
    writer: Mutex<()>,
}

/// Reject malformed subscribe input before any store access.
pub fn validate_subscription(
    subscriber_id: &str,
    target_price: Decimal,
    delivery_target: &str,
) -> Result<(), InvalidInputError> {
    if subscriber_id.trim().is_empty() {
        return Err(InvalidInputError::new("subscriber_id", "must not be empty"));
    }
    if delivery_target.trim().is_empty() {
        return Err(InvalidInputError::new("delivery_target", "must not be empty"));
    }
    if target_price <= Decimal::ZERO {
        return Err(InvalidInputError::new(
            "target_price",
            format!("must be greater than zero, got {}", target_price),
        ));
    }
    Ok(())
}

impl SubscriptionStore {
    /// Rehydrate the store from everything the repository holds.
    pub async fn load(
        repository: Arc<dyn SubscriptionRepository + Send + Sync>,
    ) -> Result<Self, PersistenceError> {
        let records = repository.load_all().await?;
        let map: SubscriptionMap = records
            .into_iter()
            .map(|sub| (sub.subscriber_id.clone(), sub))
            .collect();

        tracing::info!(
            "Loaded {} subscriptions ({} active)",
            map.len(),
            map.values().filter(|s| s.active).count()
        );

        Ok(Self {
            repository,
            committed: RwLock::new(Arc::new(map)),
            writer: Mutex::new(()),
        })
    }

    /// Create or overwrite `subscriber_id`'s subscription and mark it active.
    ///
    /// Last write wins: an existing record, active or not, is replaced.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
        target_price: Decimal,
        delivery_target: &str,
    ) -> Result<Subscription, SubscriptionError> {
        validate_subscription(subscriber_id, target_price, delivery_target)?;

        let subscription = Subscription {
            subscriber_id: subscriber_id.trim().to_string(),
            target_price,
            delivery_target: delivery_target.trim().to_string(),
            active: true,
            created_at: Utc::now(),
        };

        let _guard = self.writer.lock().await;
        self.repository.upsert(&subscription).await?;
        self.commit(|map| {
            map.insert(subscription.subscriber_id.clone(), subscription.clone());
        })
        .await;

        tracing::info!(
            "Subscriber {} alerting at <= {}",
            subscription.subscriber_id,
            subscription.target_price
        );
        Ok(subscription)
    }

    /// Deactivate `subscriber_id`. Unknown or already inactive ids are a
    /// no-op and return `Ok(false)`.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> Result<bool, PersistenceError> {
        let subscriber_id = subscriber_id.trim();
        let _guard = self.writer.lock().await;

        let is_active = self
            .committed
            .read()
            .await
            .get(subscriber_id)
            .map_or(false, |sub| sub.active);
        if !is_active {
            return Ok(false);
        }

        self.repository.set_active(subscriber_id, false).await?;
        self.commit(|map| {
            if let Some(sub) = map.get_mut(subscriber_id) {
                sub.active = false;
            }
        })
        .await;

        tracing::info!("Subscriber {} deactivated", subscriber_id);
        Ok(true)
    }

    /// Deactivate `subscriber_id` only if its current subscription was
    /// created at `created_at`. A re-subscribe in the meantime replaced it,
    /// and the replacement stays active; returns `Ok(false)` in that case.
    pub async fn unsubscribe_if_current(
        &self,
        subscriber_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let subscriber_id = subscriber_id.trim();
        let _guard = self.writer.lock().await;

        let is_current = self
            .committed
            .read()
            .await
            .get(subscriber_id)
            .map_or(false, |sub| sub.active && sub.created_at == created_at);
        if !is_current {
            return Ok(false);
        }

        if !self
            .repository
            .deactivate_if_current(subscriber_id, created_at)
            .await?
        {
            tracing::warn!(
                "Subscriber {} changed on disk, leaving it active",
                subscriber_id
            );
            return Ok(false);
        }
        self.commit(|map| {
            if let Some(sub) = map.get_mut(subscriber_id) {
                sub.active = false;
            }
        })
        .await;

        tracing::info!("Subscriber {} deactivated after its alert", subscriber_id);
        Ok(true)
    }

    pub async fn get(&self, subscriber_id: &str) -> Option<Subscription> {
        self.snapshot().await.get(subscriber_id.trim()).cloned()
    }

    /// Active subscriptions ordered by subscriber id.
    pub async fn active_all(&self) -> Vec<Subscription> {
        let map = self.snapshot().await;
        let mut active: Vec<Subscription> = map.values().filter(|s| s.active).cloned().collect();
        active.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        active
    }

    /// Every subscription, including inactive ones, ordered by subscriber id.
    pub async fn all(&self) -> Vec<Subscription> {
        let map = self.snapshot().await;
        let mut all: Vec<Subscription> = map.values().cloned().collect();
        all.sort_by(|a, b| a.subscriber_id.cmp(&b.subscriber_id));
        all
    }

    async fn snapshot(&self) -> Arc<SubscriptionMap> {
        self.committed.read().await.clone()
    }

    /// Copy-on-write swap of the committed map. Caller holds the writer mutex.
    async fn commit(&self, apply: impl FnOnce(&mut SubscriptionMap)) {
        let mut next = (*self.snapshot().await).clone();
        apply(&mut next);
        *self.committed.write().await = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    use crate::db::create_pool;
    use crate::repository::SqliteSubscriptionRepository;

    /// Repository whose writes can be made to fail on demand.
    struct FlakyRepository {
        inner: SqliteSubscriptionRepository,
        failing: AtomicBool,
    }

    impl FlakyRepository {
        async fn new() -> Self {
            let pool = create_pool("sqlite::memory:").await.unwrap();
            Self {
                inner: SqliteSubscriptionRepository::new(pool),
                failing: AtomicBool::new(false),
            }
        }

        fn fail_writes(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), PersistenceError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(PersistenceError::new("disk unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SubscriptionRepository for FlakyRepository {
        async fn load_all(&self) -> Result<Vec<Subscription>, PersistenceError> {
            self.inner.load_all().await
        }

        async fn upsert(&self, subscription: &Subscription) -> Result<(), PersistenceError> {
            self.check()?;
            self.inner.upsert(subscription).await
        }

        async fn set_active(&self, subscriber_id: &str, active: bool) -> Result<bool, PersistenceError> {
            self.check()?;
            self.inner.set_active(subscriber_id, active).await
        }

        async fn deactivate_if_current(
            &self,
            subscriber_id: &str,
            created_at: DateTime<Utc>,
        ) -> Result<bool, PersistenceError> {
            self.check()?;
            self.inner.deactivate_if_current(subscriber_id, created_at).await
        }
    }

    async fn memory_store() -> SubscriptionStore {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        SubscriptionStore::load(Arc::new(SqliteSubscriptionRepository::new(pool)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn subscribe_then_get_returns_written_subscription() {
        let store = memory_store().await;
        let written = store.subscribe("alice", dec!(160), "chat-1").await.unwrap();

        let read = store.get("alice").await.unwrap();
        assert_eq!(read, written);
        assert!(read.active);
        assert_eq!(read.target_price, dec!(160));
        assert_eq!(read.delivery_target, "chat-1");
    }

    #[tokio::test]
    async fn resubscribe_reactivates_with_new_threshold() {
        let store = memory_store().await;
        store.subscribe("alice", dec!(160), "chat-1").await.unwrap();
        assert!(store.unsubscribe("alice").await.unwrap());
        assert!(!store.get("alice").await.unwrap().active);

        store.subscribe("alice", dec!(140), "chat-2").await.unwrap();

        let read = store.get("alice").await.unwrap();
        assert!(read.active);
        assert_eq!(read.target_price, dec!(140));
        assert_eq!(read.delivery_target, "chat-2");
        assert_eq!(store.all().await.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_id_is_noop() {
        let store = memory_store().await;
        assert!(!assert_ok!(store.unsubscribe("ghost").await));
        assert!(store.get("ghost").await.is_none());
    }

    #[tokio::test]
    async fn unsubscribe_twice_is_noop_second_time() {
        let store = memory_store().await;
        store.subscribe("bob", dec!(99), "chat").await.unwrap();
        assert!(store.unsubscribe("bob").await.unwrap());
        assert!(!store.unsubscribe("bob").await.unwrap());
    }

    #[tokio::test]
    async fn unsubscribe_if_current_spares_a_newer_subscription() {
        let store = memory_store().await;
        let old = store.subscribe("alice", dec!(160), "chat-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let fresh = store.subscribe("alice", dec!(100), "chat-2").await.unwrap();

        assert!(!store.unsubscribe_if_current("alice", old.created_at).await.unwrap());
        assert_eq!(store.get("alice").await.unwrap(), fresh);

        assert!(store.unsubscribe_if_current("alice", fresh.created_at).await.unwrap());
        assert!(!store.get("alice").await.unwrap().active);
    }

    #[tokio::test]
    async fn inactive_subscriptions_are_retained_but_not_active() {
        let store = memory_store().await;
        store.subscribe("alice", dec!(160), "a").await.unwrap();
        store.subscribe("bob", dec!(150), "b").await.unwrap();
        store.unsubscribe("alice").await.unwrap();

        let active: Vec<_> = store.active_all().await.into_iter().map(|s| s.subscriber_id).collect();
        assert_eq!(active, vec!["bob"]);
        assert_eq!(store.all().await.len(), 2);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_store() {
        let store = memory_store().await;

        let err = store.subscribe("alice", dec!(0), "chat").await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput(ref e) if e.field == "target_price"));
        let err = store.subscribe("alice", dec!(-5), "chat").await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput(_)));
        let err = store.subscribe("  ", dec!(10), "chat").await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput(ref e) if e.field == "subscriber_id"));
        let err = store.subscribe("alice", dec!(10), "").await.unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidInput(ref e) if e.field == "delivery_target"));

        assert!(store.all().await.is_empty());
    }

    #[tokio::test]
    async fn failed_subscribe_write_leaves_memory_unchanged() {
        let repo = Arc::new(FlakyRepository::new().await);
        let store = SubscriptionStore::load(repo.clone()).await.unwrap();
        let original = store.subscribe("alice", dec!(160), "chat").await.unwrap();

        repo.fail_writes(true);
        let err = assert_err!(store.subscribe("alice", dec!(120), "chat").await);
        assert!(matches!(err, SubscriptionError::Persistence(_)));
        assert_err!(store.subscribe("bob", dec!(120), "chat").await);

        assert_eq!(store.get("alice").await.unwrap(), original);
        assert!(store.get("bob").await.is_none());
    }

    #[tokio::test]
    async fn failed_unsubscribe_write_keeps_subscription_active() {
        let repo = Arc::new(FlakyRepository::new().await);
        let store = SubscriptionStore::load(repo.clone()).await.unwrap();
        store.subscribe("alice", dec!(160), "chat").await.unwrap();

        repo.fail_writes(true);
        assert_err!(store.unsubscribe("alice").await);
        assert!(store.get("alice").await.unwrap().active);

        repo.fail_writes(false);
        assert!(store.unsubscribe("alice").await.unwrap());
    }

    #[tokio::test]
    async fn reload_reproduces_exact_state() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("subs.db").display());

        let before = {
            let pool = create_pool(&url).await.unwrap();
            let store = SubscriptionStore::load(Arc::new(SqliteSubscriptionRepository::new(pool.clone())))
                .await
                .unwrap();
            store.subscribe("alice", dec!(160.25), "chat-a").await.unwrap();
            store.subscribe("bob", dec!(150), "chat-b").await.unwrap();
            store.subscribe("carol", dec!(99.9), "chat-c").await.unwrap();
            store.unsubscribe("bob").await.unwrap();
            let all = store.all().await;
            pool.close().await;
            all
        };

        let pool = create_pool(&url).await.unwrap();
        let reloaded = SubscriptionStore::load(Arc::new(SqliteSubscriptionRepository::new(pool)))
            .await
            .unwrap();

        assert_eq!(reloaded.all().await, before);
        let active: Vec<_> = reloaded
            .active_all()
            .await
            .into_iter()
            .map(|s| s.subscriber_id)
            .collect();
        assert_eq!(active, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn concurrent_subscribes_are_all_committed() {
        let store = Arc::new(memory_store().await);
        let mut handles = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .subscribe(&format!("user-{:02}", i), Decimal::from(100 + i), "chat")
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.active_all().await.len(), 20);
    }

    #[test]
    fn is_met_by_requires_active_and_price_at_or_below_target() {
        let fare = Fare {
            date: chrono::NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            price: dec!(150),
            currency: "MAD".to_string(),
            departure_time: None,
            arrival_time: None,
            available: true,
        };
        let mut sub = Subscription {
            subscriber_id: "alice".to_string(),
            target_price: dec!(150),
            delivery_target: "chat".to_string(),
            active: true,
            created_at: Utc::now(),
        };
        assert!(sub.is_met_by(&fare));
        sub.target_price = dec!(149.99);
        assert!(!sub.is_met_by(&fare));
        sub.target_price = dec!(200);
        sub.active = false;
        assert!(!sub.is_met_by(&fare));
    }
}

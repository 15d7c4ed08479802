//! Durable subscription storage.
//!
//! [`SubscriptionStore`](crate::store::SubscriptionStore) writes through a
//! [`SubscriptionRepository`] before it changes its in-memory state. The
//! SQLite implementation keeps one row per subscriber; rows are never
//! deleted, deactivation just clears `active`.
//!
//! Prices are stored as decimal text and timestamps as RFC 3339 strings so
//! a reload reproduces the exact values that were written.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::error::PersistenceError;
use crate::store::Subscription;

/// Backend for subscription records.
#[async_trait]
pub trait SubscriptionRepository {
    /// Every stored subscription, active or not.
    async fn load_all(&self) -> Result<Vec<Subscription>, PersistenceError>;

    /// Insert or fully overwrite the record for `subscription.subscriber_id`.
    async fn upsert(&self, subscription: &Subscription) -> Result<(), PersistenceError>;

    /// Set the active flag. Returns `false` when no record exists.
    async fn set_active(&self, subscriber_id: &str, active: bool) -> Result<bool, PersistenceError>;

    /// Clear the active flag only while the stored record is still the one
    /// created at `created_at`. Returns `false` when nothing matched.
    async fn deactivate_if_current(
        &self,
        subscriber_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError>;
}

/// Repository for reading and writing subscriptions to SQLite.
pub struct SqliteSubscriptionRepository {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn subscription_from_row(row: &SqliteRow) -> Result<Subscription, PersistenceError> {
    let subscriber_id: String = row.try_get("subscriber_id")?;
    let target_price: String = row.try_get("target_price")?;
    let delivery_target: String = row.try_get("delivery_target")?;
    let active: i64 = row.try_get("active")?;
    let created_at: String = row.try_get("created_at")?;

    let target_price = Decimal::from_str(&target_price).map_err(|err| {
        PersistenceError::new(format!(
            "Corrupt target_price '{}' for subscriber {}: {}",
            target_price, subscriber_id, err
        ))
    })?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|err| {
            PersistenceError::new(format!(
                "Corrupt created_at '{}' for subscriber {}: {}",
                created_at, subscriber_id, err
            ))
        })?
        .with_timezone(&Utc);

    Ok(Subscription {
        subscriber_id,
        target_price,
        delivery_target,
        active: active != 0,
        created_at,
    })
}

#[async_trait]
impl SubscriptionRepository for SqliteSubscriptionRepository {
    async fn load_all(&self) -> Result<Vec<Subscription>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT subscriber_id, target_price, delivery_target, active, created_at
             FROM subscriptions
             ORDER BY subscriber_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(subscription_from_row).collect()
    }

    async fn upsert(&self, subscription: &Subscription) -> Result<(), PersistenceError> {
        let active_int: i64 = if subscription.active { 1 } else { 0 };

        sqlx::query(
            "INSERT INTO subscriptions
             (subscriber_id, target_price, delivery_target, active, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(subscriber_id) DO UPDATE SET
                target_price = excluded.target_price,
                delivery_target = excluded.delivery_target,
                active = excluded.active,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at",
        )
        .bind(&subscription.subscriber_id)
        .bind(subscription.target_price.to_string())
        .bind(&subscription.delivery_target)
        .bind(active_int)
        .bind(subscription.created_at.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_active(&self, subscriber_id: &str, active: bool) -> Result<bool, PersistenceError> {
        let active_int: i64 = if active { 1 } else { 0 };

        let result = sqlx::query(
            "UPDATE subscriptions SET active = ?, updated_at = ? WHERE subscriber_id = ?",
        )
        .bind(active_int)
        .bind(Utc::now().to_rfc3339())
        .bind(subscriber_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_if_current(
        &self,
        subscriber_id: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET active = 0, updated_at = ?
             WHERE subscriber_id = ? AND created_at = ? AND active = 1",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(subscriber_id)
        .bind(created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! In-memory fare cache.
//!
//! Holds the latest `FareSnapshot` behind an `Arc`. `update` swaps the whole
//! snapshot in one assignment, so a reader holding the lock (or a cloned
//! `Arc`) always sees one complete fetch. Callers share the cache as
//! `Arc<RwLock<FareCache>>` between the scheduler and the HTTP handlers.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::fares::{Fare, FareSet, FareWindow};

/// One successful fetch and the moment it completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FareSnapshot {
    set: FareSet,
    fetched_at: DateTime<Utc>,
}

/// Summary over the available fares of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FareStats {
    pub count: usize,
    pub min: Decimal,
    pub max: Decimal,
    pub average: Decimal,
    pub best_date: NaiveDate,
    pub currency: String,
}

impl FareSnapshot {
    pub fn new(set: FareSet, fetched_at: DateTime<Utc>) -> Self {
        Self { set, fetched_at }
    }

    pub fn fares(&self) -> &[Fare] {
        self.set.fares()
    }

    pub fn window(&self) -> FareWindow {
        self.set.window()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn lowest(&self) -> Option<&Fare> {
        self.set.lowest()
    }

    /// The `limit` cheapest available fares at or below `price_ceiling`,
    /// returned in date order.
    pub fn cheapest(&self, limit: usize, price_ceiling: Option<Decimal>) -> Vec<Fare> {
        let mut fares: Vec<Fare> = self
            .set
            .available()
            .filter(|fare| price_ceiling.map_or(true, |ceiling| fare.price <= ceiling))
            .cloned()
            .collect();

        fares.sort_by(|a, b| a.price.cmp(&b.price).then(a.date.cmp(&b.date)));
        fares.truncate(limit);
        fares.sort_by_key(|fare| fare.date);
        fares
    }

    pub fn stats(&self) -> Option<FareStats> {
        let lowest = self.set.lowest()?;
        let mut count = 0usize;
        let mut total = Decimal::ZERO;
        let mut max = lowest.price;

        for fare in self.set.available() {
            count += 1;
            total += fare.price;
            max = max.max(fare.price);
        }

        Some(FareStats {
            count,
            min: lowest.price,
            max,
            average: (total / Decimal::from(count)).round_dp(2),
            best_date: lowest.date,
            currency: lowest.currency.clone(),
        })
    }
}

/// Latest fare snapshot, replaced wholesale on every successful fetch.
#[derive(Debug, Default)]
pub struct FareCache {
    snapshot: Option<Arc<FareSnapshot>>,
}

impl FareCache {
    pub fn new() -> Self {
        Self { snapshot: None }
    }

    /// Replace the current snapshot with `set`, stamped now.
    pub fn update(&mut self, set: FareSet) -> Arc<FareSnapshot> {
        self.replace(FareSnapshot::new(set, Utc::now()))
    }

    pub fn replace(&mut self, snapshot: FareSnapshot) -> Arc<FareSnapshot> {
        let snapshot = Arc::new(snapshot);
        self.snapshot = Some(snapshot.clone());
        snapshot
    }

    pub fn snapshot(&self) -> Option<Arc<FareSnapshot>> {
        self.snapshot.clone()
    }

    /// `None` means no determination is possible, never a zero price.
    pub fn lowest(&self) -> Option<Fare> {
        self.snapshot
            .as_ref()
            .and_then(|snapshot| snapshot.lowest().cloned())
    }

    /// Time since the cached fetch completed; `None` before the first fetch.
    pub fn age(&self) -> Option<Duration> {
        self.snapshot
            .as_ref()
            .map(|snapshot| Utc::now() - snapshot.fetched_at())
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }
}

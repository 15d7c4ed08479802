//! Scripted `FareSource` for tests and local runs without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fares::{
    provider::FareSource,
    types::{Fare, FareSet, FareWindow},
};

#[derive(Debug, Clone)]
enum Behavior {
    Fares(Vec<Fare>),
    FailStatus(u16),
}

/// Returns whatever it was last told to, and counts calls.
#[derive(Debug)]
pub struct MockFareSource {
    behavior: Mutex<Behavior>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl Default for MockFareSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFareSource {
    /// A source that answers with an empty fare set.
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(Behavior::Fares(Vec::new())),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_fares(self, fares: Vec<Fare>) -> Self {
        self.set_fares(fares);
        self
    }

    pub fn with_status_error(self, status: u16) -> Self {
        self.fail_with_status(status);
        self
    }

    /// Sleep before answering; lets tests hold a fetch in flight.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    /// Applies to fetches started after the call.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self
            .delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
    }

    pub fn set_fares(&self, fares: Vec<Fare>) {
        *self.lock() = Behavior::Fares(fares);
    }

    pub fn fail_with_status(&self, status: u16) {
        *self.lock() = Behavior::FailStatus(status);
    }

    /// Number of `fetch` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Behavior> {
        self.behavior
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl FareSource for MockFareSource {
    async fn fetch(&self, window: FareWindow) -> Result<FareSet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .delay
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let behavior = self.lock().clone();
        match behavior {
            Behavior::Fares(fares) => Ok(FareSet::new(window, fares)),
            Behavior::FailStatus(status) => Err(FetchError::Status { status }),
        }
    }

    fn provider_name(&self) -> &str {
        "Mock"
    }
}

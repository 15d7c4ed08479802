//! Fare Source Interface
//!
//! Abstraction over wherever fare data comes from, so the engine can be
//! driven by the live provider or by a scripted source in tests.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::fares::types::{FareSet, FareWindow};

/// Trait for fare providers to ensure data source independence
#[async_trait]
pub trait FareSource {
    /// Fetch the normalized fares for every day of `window`.
    ///
    /// An empty set means the provider answered and has no flights in the
    /// window. Implementations must not retry.
    async fn fetch(&self, window: FareWindow) -> Result<FareSet, FetchError>;

    /// Get the name of this provider for logging/debugging
    fn provider_name(&self) -> &str;
}

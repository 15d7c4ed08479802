//! Fare data: canonical types, the source abstraction and its providers.
//!
//! Everything here is independent of engine state; a `FareSource` only
//! turns a date window into a normalized `FareSet`.

pub mod mock;
pub mod provider;
pub mod ryanair;
pub mod types;

pub use mock::MockFareSource;
pub use provider::FareSource;
pub use ryanair::RyanairFareSource;
pub use types::{Fare, FareSet, FareWindow, Route};

// Library root: the engine and its front-ends, shared by `src/main.rs` and
// the integration tests in `tests/`.

pub mod alerts;
pub mod api;
pub mod cache;
pub mod db;
pub mod engine;
pub mod error;
pub mod fares;
pub mod metrics;
pub mod repository;
pub mod scheduler;
pub mod store;

// Binary plumbing. Public so tests can build configs and parse arguments.
pub mod cli;
pub mod config;
pub mod logging;

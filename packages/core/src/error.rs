use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failure to obtain a fare set from the provider.
///
/// Always recoverable: the engine keeps serving the previous snapshot.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Fare provider timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Fare provider returned HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed fare response: {message}")]
    Malformed { message: String },

    /// The requested window was rejected before any network call.
    #[error(transparent)]
    InvalidWindow(#[from] InvalidInputError),
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed { message: message.into() }
    }

    /// Transient failures worth another attempt. Client errors, bad
    /// payloads and invalid windows would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::Timeout { .. } => true,
            FetchError::Status { status } => *status >= 500 || *status == 429,
            FetchError::Malformed { .. } | FetchError::InvalidWindow(_) => false,
        }
    }
}

/// A subscription write (or the startup load) could not be made durable.
#[derive(Error, Debug)]
#[error("Persistence error: {message}")]
pub struct PersistenceError {
    pub message: String,
}

impl PersistenceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Caller input rejected before it reaches a store or the network.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid {field}: {message}")]
pub struct InvalidInputError {
    pub field: &'static str,
    pub message: String,
}

impl InvalidInputError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Why a subscribe/unsubscribe command failed.
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A notifier could not deliver an alert.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery request failed: {message}")]
    Transport { message: String },

    #[error("Delivery endpoint rejected alert with HTTP {status}")]
    Rejected { status: u16 },

    #[error("Notifier misconfigured: {message}")]
    Config { message: String },
}

/// Unified application error.
///
/// Used by the binary and the HTTP layer; each variant maps onto a status code.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        match err {
            SubscriptionError::InvalidInput(err) => AppError::InvalidInput(err),
            SubscriptionError::Persistence(err) => AppError::Persistence(err),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) | AppError::Fetch(FetchError::InvalidWindow(_)) => {
                StatusCode::BAD_REQUEST
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Fetch(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_) | AppError::Persistence(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

//! Error types shared across the console core.

use thiserror::Error;

use crate::models::OrderStatus;

/// Errors raised while talking to the REST backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS, body read)
    #[error("{0}")]
    Http(String),

    /// Token missing, invalid or expired
    #[error("Session is invalid or expired")]
    Unauthorized,

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// The backend answered with `success: false`
    #[error("{message}")]
    Rejected { message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// True when the error means the stored token can no longer be used.
    /// A 403 is a permission problem and leaves the session alone.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by the order lifecycle.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order #{id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order #{0} is not loaded")]
    UnknownOrder(i64),

    #[error("Cart is empty")]
    EmptyCart,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors raised by the local key/value store and credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("keyring: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by the session guard.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while writing generated documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Document has no pages")]
    Empty,
}

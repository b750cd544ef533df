//! Shared primitives for all Rust crates in Evidex.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use thiserror::Error;

pub use auth::{UserIdentity, UserRole};

/// Result type used across Evidex crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by role policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request targets more items than the configured cap allows.
    #[error("limit exceeded: {message}")]
    LimitExceeded {
        /// Human readable explanation.
        message: String,
        /// Number of items the request would have touched.
        requested: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// Object storage backend is unconfigured or unreachable.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A destructive-operation safety precondition was not met.
    #[error("safety gate failed: {0}")]
    SafetyGate(String),

    /// A destructive operation was attempted before its cooldown elapsed.
    #[error("cooldown active: retry in {retry_after_seconds}s")]
    CooldownActive {
        /// Seconds until the operation may be retried.
        retry_after_seconds: u64,
    },

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for errors whose detail must not be shown to callers.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

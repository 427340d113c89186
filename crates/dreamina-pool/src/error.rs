//! Error types for pool operations

/// Errors from pool operations.
///
/// Upstream identity failures never show up here: the store logs them and
/// leaves the affected account out of the pool instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("admission gate closed for user {0}")]
    GateClosed(String),

    #[error("session cache error: {0}")]
    Cache(#[from] dreamina_auth::Error),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

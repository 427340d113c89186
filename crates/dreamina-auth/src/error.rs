//! Error types for identity service and cache operations

/// Errors from login, credit verification and cache I/O.
///
/// Every upstream failure maps onto one of these variants so the pool can
/// branch on a typed result instead of catching panics or parse errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{endpoint} endpoint returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("rejected by identity service: {0}")]
    Rejected(String),

    #[error("missing field in response: {0}")]
    MissingField(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("cache parse error: {0}")]
    CacheParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

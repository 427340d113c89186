//! Service-specific error types

use axum::http::StatusCode;
use thiserror::Error;

/// Ways a draw can fail, each rendered to the caller as one human-readable
/// message.
///
/// Startup failures (bad config, bind errors) go through `anyhow` in `main`
/// and never reach this type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid draw request: {0}")]
    InvalidRequest(String),

    #[error("no account has enough credit for this draw (needs {cost})")]
    NoAccountAvailable { cost: i64 },

    #[error("draw failed: {0}")]
    Generation(#[from] imagegen::GenerationError),

    #[error("could not admit request: {0}")]
    Admission(#[from] dreamina_pool::Error),
}

impl Error {
    /// HTTP status returned for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NoAccountAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Generation(_) => StatusCode::BAD_GATEWAY,
            Error::Admission(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Value of `error.type` in the JSON error body, also the metrics outcome label.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidRequest(_) => "invalid_request",
            Error::NoAccountAvailable { .. } => "no_account",
            Error::Generation(_) => "generation_error",
            Error::Admission(_) => "admission_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagegen::GenerationError;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert_eq!(
            Error::NoAccountAvailable { cost: 9 }.to_string(),
            "no account has enough credit for this draw (needs 9)"
        );
        assert_eq!(
            Error::Generation(GenerationError::Upstream("prompt blocked".into())).to_string(),
            "draw failed: prompt blocked"
        );
        assert!(
            Error::InvalidRequest("prompt is empty".into())
                .to_string()
                .contains("prompt is empty")
        );
    }

    #[test]
    fn status_codes_follow_failure_origin() {
        assert_eq!(
            Error::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NoAccountAvailable { cost: 1 }.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            Error::Generation(GenerationError::Http("refused".into())).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            Error::Admission(dreamina_pool::Error::GateClosed("u1".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn kinds_are_distinct() {
        let kinds = [
            Error::InvalidRequest("x".into()).kind(),
            Error::NoAccountAvailable { cost: 1 }.kind(),
            Error::Generation(GenerationError::Malformed("x".into())).kind(),
            Error::Admission(dreamina_pool::Error::GateClosed("u".into())).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }
}

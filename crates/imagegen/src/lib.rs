//! Image generation abstraction
//!
//! Defines the `ImageGenerator` trait that decouples the draw handler from the
//! upstream generation API. `OpenApiGenerator` talks to an OpenAI-style
//! `/v1/images/*` service; tests substitute their own implementations.

pub mod openapi;

pub use openapi::{OpenApiGenerator, build_payload};

use std::future::Future;
use std::pin::Pin;

/// One generation job.
///
/// With `image_url` set the job is image-to-image, otherwise text-to-image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub resolution: String,
    /// Fixed aspect ratio such as `"16:9"`. Text-to-image jobs without one let
    /// the service pick a ratio.
    pub ratio: Option<String>,
    pub image_url: Option<String>,
}

impl GenerationRequest {
    pub fn is_image_to_image(&self) -> bool {
        self.image_url.is_some()
    }
}

/// Errors from generation calls.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(String),

    #[error("generation endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP 200 but no images, carrying the service's own message
    #[error("{0}")]
    Upstream(String),

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Result alias for generation operations.
pub type Result<T> = std::result::Result<T, GenerationError>;

/// Abstraction over the upstream image generation API.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn ImageGenerator>`).
pub trait ImageGenerator: Send + Sync {
    /// Identifier for logging (e.g. "openapi")
    fn id(&self) -> &str;

    /// Run one generation job authenticated with `session_token`, returning
    /// the URLs of the produced images.
    fn generate<'a>(
        &'a self,
        session_token: &'a str,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>>;
}

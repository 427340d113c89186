//! OpenAI-style generation client
//!
//! Text-to-image jobs POST to `{base}/v1/images/generations`, image-to-image
//! jobs to `{base}/v1/images/compositions`. The account session token is sent
//! as a Bearer token, optionally behind a configured prefix for deployments
//! that front the service with a reverse proxy.

use std::future::Future;
use std::pin::Pin;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::{GenerationError, GenerationRequest, ImageGenerator, Result};

/// Build the JSON body for a generation job.
///
/// Image-to-image jobs carry the source in `images`. A configured ratio is
/// sent as `ratio`; text-to-image jobs without one ask for
/// `intelligent_ratio` instead.
pub fn build_payload(request: &GenerationRequest) -> Value {
    let mut payload = json!({
        "model": request.model,
        "prompt": request.prompt,
        "resolution": request.resolution,
    });

    if let Some(image_url) = &request.image_url {
        payload["images"] = json!([image_url]);
    }

    match &request.ratio {
        Some(ratio) => payload["ratio"] = json!(ratio),
        None if !request.is_image_to_image() => payload["intelligent_ratio"] = json!(true),
        None => {}
    }

    payload
}

/// Generation client for an OpenAI-style images API.
pub struct OpenApiGenerator {
    client: reqwest::Client,
    base_url: String,
    token_prefix: String,
}

impl OpenApiGenerator {
    pub fn new(client: reqwest::Client, base_url: &str, token_prefix: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_prefix: token_prefix.to_string(),
        }
    }

    fn endpoint(&self, request: &GenerationRequest) -> String {
        let path = if request.is_image_to_image() {
            "/v1/images/compositions"
        } else {
            "/v1/images/generations"
        };
        format!("{}{path}", self.base_url)
    }

    async fn run(&self, session_token: &str, request: &GenerationRequest) -> Result<Vec<String>> {
        let url = self.endpoint(request);
        debug!(url = %url, img2img = request.is_image_to_image(), "sending generation request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(format!("{}{session_token}", self.token_prefix))
            .json(&build_payload(request))
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(status = status.as_u16(), body = %body, "generation endpoint returned error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(format!("body is not JSON: {e}")))?;

        parse_images(&body)
    }
}

/// Pull image URLs out of a 200 response.
fn parse_images(body: &Value) -> Result<Vec<String>> {
    let data = match body.get("data") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("generation failed without a message");
            return Err(GenerationError::Upstream(message.to_string()));
        }
        Some(other) => {
            return Err(GenerationError::Malformed(format!(
                "data is not a list: {other}"
            )));
        }
    };

    let urls: Vec<String> = data
        .iter()
        .filter_map(|item| item.get("url").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(GenerationError::Malformed("no image URLs in data".into()));
    }
    Ok(urls)
}

impl ImageGenerator for OpenApiGenerator {
    fn id(&self) -> &str {
        "openapi"
    }

    fn generate<'a>(
        &'a self,
        session_token: &'a str,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send + 'a>> {
        Box::pin(self.run(session_token, request))
    }
}

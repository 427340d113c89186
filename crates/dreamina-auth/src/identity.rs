//! Identity service abstraction
//!
//! The account pool never talks HTTP directly. It holds an
//! `Arc<dyn IdentityService>` so the cache-then-login fallback can be driven by
//! a fake in tests and by `HttpIdentityService` in production.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::session::{self, Endpoints};

/// Upstream identity operations needed by the account pool.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn IdentityService>`).
pub trait IdentityService: Send + Sync {
    /// Log in with email and password, returning a fresh session token.
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Validate a session token and return its current credit balance.
    fn verify_credit<'a>(
        &'a self,
        session_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>>;
}

/// Identity service backed by the real Dreamina web endpoints.
///
/// Request timeouts come from the supplied `reqwest::Client`.
pub struct HttpIdentityService {
    client: reqwest::Client,
    endpoints: Endpoints,
}

impl HttpIdentityService {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoints(client, Endpoints::default())
    }

    pub fn with_endpoints(client: reqwest::Client, endpoints: Endpoints) -> Self {
        Self { client, endpoints }
    }
}

impl IdentityService for HttpIdentityService {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(session::login(&self.client, &self.endpoints, email, password))
    }

    fn verify_credit<'a>(
        &'a self,
        session_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(session::fetch_credit(
            &self.client,
            &self.endpoints,
            session_token,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_service_logs_in_and_verifies_through_trait_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("set-cookie", "sessionid=tok_trait; Path=/")
                    .set_body_json(json!({"message": "success"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/credit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ret": "0",
                "data": {"credit": {"vip_credit": 4, "gift_credit": 4, "purchase_credit": 4}}
            })))
            .mount(&server)
            .await;

        let service: Arc<dyn IdentityService> = Arc::new(HttpIdentityService::with_endpoints(
            reqwest::Client::new(),
            Endpoints {
                login: format!("{}/login", server.uri()),
                credit: format!("{}/credit", server.uri()),
            },
        ));

        let token = service.login("a@example.com", "pw").await.unwrap();
        assert_eq!(token, "tok_trait");
        assert_eq!(service.verify_credit(&token).await.unwrap(), 12);
    }
}

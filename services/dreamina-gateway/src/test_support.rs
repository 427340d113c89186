//! In-memory upstream fakes for gateway tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::Secret;
use dreamina_auth::{CacheFile, IdentityService};
use dreamina_pool::{AccountCredentials, SessionStore};
use imagegen::{GenerationError, GenerationRequest, ImageGenerator};

/// Identity service where every login with password `pw` succeeds and
/// issues `tok_{email}`. Credit per token is adjustable between calls.
#[derive(Default)]
pub struct FakeIdentity {
    credit: Mutex<HashMap<String, i64>>,
}

impl FakeIdentity {
    pub fn set_credit(&self, email: &str, credit: i64) {
        self.credit
            .lock()
            .unwrap()
            .insert(format!("tok_{email}"), credit);
    }
}

impl IdentityService for FakeIdentity {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = dreamina_auth::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            if password == "pw" {
                Ok(format!("tok_{email}"))
            } else {
                Err(dreamina_auth::Error::Rejected("bad password".into()))
            }
        })
    }

    fn verify_credit<'a>(
        &'a self,
        session_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = dreamina_auth::Result<i64>> + Send + 'a>> {
        Box::pin(async move {
            self.credit
                .lock()
                .unwrap()
                .get(session_token)
                .copied()
                .ok_or_else(|| dreamina_auth::Error::Rejected("expired".into()))
        })
    }
}

/// A session store loaded from fake accounts, with its cache in a temp dir.
pub struct TestPool {
    pub store: Arc<SessionStore>,
    pub identity: Arc<FakeIdentity>,
    pub accounts: Vec<AccountCredentials>,
    _dir: tempfile::TempDir,
}

impl TestPool {
    pub async fn new(balances: &[(&str, i64)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let identity = Arc::new(FakeIdentity::default());
        let accounts: Vec<AccountCredentials> = balances
            .iter()
            .map(|(email, credit)| {
                identity.set_credit(email, *credit);
                AccountCredentials {
                    email: email.to_string(),
                    password: Secret::new("pw".to_string()),
                }
            })
            .collect();

        let store = Arc::new(SessionStore::new(
            CacheFile::new(dir.path().join("cache.json")),
            identity.clone(),
        ));
        store.initialize_sessions(&accounts).await;

        Self {
            store,
            identity,
            accounts,
            _dir: dir,
        }
    }
}

/// Generator that returns a fixed outcome and records what it was asked.
pub struct FakeGenerator {
    outcome: Result<Vec<String>, String>,
    failure: Mutex<Option<GenerationError>>,
    delay: Duration,
    tokens: Mutex<Vec<String>>,
    requests: Mutex<Vec<GenerationRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeGenerator {
    pub fn returning(urls: &[&str]) -> Self {
        Self::with_outcome(Ok(urls.iter().map(|u| u.to_string()).collect()), None)
    }

    /// Fails every call. The first call returns `error` as-is, later calls
    /// return `Upstream` with the same message.
    pub fn failing(error: GenerationError) -> Self {
        let message = error.to_string();
        Self::with_outcome(Err(message), Some(error))
    }

    fn with_outcome(outcome: Result<Vec<String>, String>, failure: Option<GenerationError>) -> Self {
        Self {
            outcome,
            failure: Mutex::new(failure),
            delay: Duration::ZERO,
            tokens: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Highest number of generate calls that overlapped.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ImageGenerator for FakeGenerator {
    fn id(&self) -> &str {
        "fake"
    }

    fn generate<'a>(
        &'a self,
        session_token: &'a str,
        request: &'a GenerationRequest,
    ) -> Pin<Box<dyn Future<Output = imagegen::Result<Vec<String>>> + Send + 'a>> {
        Box::pin(async move {
            self.tokens.lock().unwrap().push(session_token.to_string());
            self.requests.lock().unwrap().push(request.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match &self.outcome {
                Ok(urls) => Ok(urls.clone()),
                Err(message) => Err(self
                    .failure
                    .lock()
                    .unwrap()
                    .take()
                    .unwrap_or_else(|| GenerationError::Upstream(message.clone()))),
            }
        })
    }
}

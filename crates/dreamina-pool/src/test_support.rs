//! In-memory identity service for pool tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::Secret;
use dreamina_auth::{Error, IdentityService, Result};

use crate::store::AccountCredentials;

/// Fake identity service.
///
/// `logins` maps email → (password, token handed out on login).
/// `tokens` maps token → credit for tokens the credit endpoint accepts.
#[derive(Default)]
pub struct FakeIdentity {
    logins: Mutex<HashMap<String, (String, String)>>,
    tokens: Mutex<HashMap<String, i64>>,
    login_calls: Mutex<HashMap<String, usize>>,
    verify_calls: AtomicUsize,
    latency: Mutex<Duration>,
}

impl FakeIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account whose login works and whose issued token is valid.
    pub fn with_account(self, email: &str, password: &str, credit: i64) -> Self {
        let token = format!("fresh_{email}");
        self.logins
            .lock()
            .unwrap()
            .insert(email.into(), (password.into(), token.clone()));
        self.tokens.lock().unwrap().insert(token, credit);
        self
    }

    /// Account whose login works but whose issued token fails verification.
    pub fn with_unverifiable_login(self, email: &str, password: &str) -> Self {
        self.logins
            .lock()
            .unwrap()
            .insert(email.into(), (password.into(), format!("dud_{email}")));
        self
    }

    /// Token the credit endpoint accepts.
    pub fn with_valid_token(self, token: &str, credit: i64) -> Self {
        self.accept(token, credit);
        self
    }

    pub fn accept(&self, token: &str, credit: i64) {
        self.tokens.lock().unwrap().insert(token.into(), credit);
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.lock().unwrap().remove(token);
    }

    pub fn login_calls(&self, email: &str) -> usize {
        self.login_calls
            .lock()
            .unwrap()
            .get(email)
            .copied()
            .unwrap_or(0)
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    /// Delay every later login and credit call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    async fn upstream_delay(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl IdentityService for FakeIdentity {
    fn login<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.upstream_delay().await;
            *self
                .login_calls
                .lock()
                .unwrap()
                .entry(email.to_string())
                .or_default() += 1;
            let logins = self.logins.lock().unwrap();
            match logins.get(email) {
                Some((expected, token)) if expected == password => Ok(token.clone()),
                _ => Err(Error::Rejected("login returned message \"error\"".into())),
            }
        })
    }

    fn verify_credit<'a>(
        &'a self,
        session_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<i64>> + Send + 'a>> {
        Box::pin(async move {
            self.upstream_delay().await;
            self.verify_calls.fetch_add(1, Ordering::SeqCst);
            self.tokens
                .lock()
                .unwrap()
                .get(session_token)
                .copied()
                .ok_or_else(|| Error::Rejected("credit endpoint returned ret=\"1014\"".into()))
        })
    }
}

pub fn credentials(email: &str, password: &str) -> AccountCredentials {
    AccountCredentials {
        email: email.into(),
        password: Secret::new(password.into()),
    }
}

//! Session store: account records, credit accounting and cache persistence
//!
//! One tokio Mutex guards the in-memory account map and every write of the
//! session cache, so initialization, debits and saves never interleave their
//! read-modify-write of the file. Initialization holds that lock across its
//! upstream calls, so readers never take it: every change to the map is
//! published as an immutable snapshot, and selection, counts and reporting
//! read the latest snapshot instead.
//!
//! Selection and debit are not reserved atomically: two concurrent requests
//! can both pick the same account before either debits it, which may drive
//! the balance below zero. Callers re-check credit on every selection.

use std::collections::HashMap;
use std::sync::Arc;

use common::Secret;
use dreamina_auth::{CacheFile, CachedSession, IdentityService, SessionMap};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Login for one upstream account, as written in configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountCredentials {
    #[serde(rename = "account")]
    pub email: String,
    pub password: Secret<String>,
}

/// An account that can be used for a paid request.
///
/// The session token is never serialized, so records can be handed to the
/// admin API as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRecord {
    pub email: String,
    #[serde(skip_serializing)]
    pub session_token: String,
    pub credit: i64,
}

impl AccountRecord {
    fn from_session(email: &str, session: &CachedSession) -> Self {
        Self {
            email: email.to_string(),
            session_token: session.session_token.clone(),
            credit: session.credit,
        }
    }
}

/// Pool counts for health and admin reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub accounts_total: usize,
    /// Accounts whose credit covers `cost`
    pub accounts_usable: usize,
    pub cost: i64,
    pub credit_total: i64,
}

/// In-memory account pool backed by the session cache file.
pub struct SessionStore {
    accounts: Mutex<SessionMap>,
    /// Copy of `accounts` as of the last completed write
    published: RwLock<Arc<SessionMap>>,
    cache: CacheFile,
    identity: Arc<dyn IdentityService>,
}

impl SessionStore {
    /// Create an empty store. Nothing is loaded until `initialize_sessions`.
    pub fn new(cache: CacheFile, identity: Arc<dyn IdentityService>) -> Self {
        Self {
            accounts: Mutex::new(SessionMap::new()),
            published: RwLock::new(Arc::new(SessionMap::new())),
            cache,
            identity,
        }
    }

    /// Authenticate every configured account and persist the result.
    ///
    /// Holds the store lock for the whole pass. For each account, in order:
    /// a cached token is verified first; if that fails (or nothing is cached)
    /// the account logs in fresh and the new token is verified for its
    /// starting balance. Accounts for which neither path works are dropped
    /// from the pool and from the cache. Accounts present in the cache but no
    /// longer configured are dropped as well.
    ///
    /// Returns the number of usable accounts.
    pub async fn initialize_sessions(&self, configured: &[AccountCredentials]) -> usize {
        let mut accounts = self.accounts.lock().await;

        // In-memory state wins over the file in case an earlier save failed
        let mut known = self.cache.read().await;
        known.extend(accounts.drain());

        let mut refreshed = SessionMap::with_capacity(configured.len());
        for account in configured {
            if refreshed.contains_key(&account.email) {
                warn!(email = %account.email, "account configured twice, ignoring duplicate");
                continue;
            }
            match self.authenticate(account, known.get(&account.email)).await {
                Some(session) => {
                    refreshed.insert(account.email.clone(), session);
                }
                None => {
                    if known.contains_key(&account.email) {
                        info!(email = %account.email, "removing dead account from session cache");
                    }
                }
            }
        }

        let unconfigured = known
            .keys()
            .filter(|email| !configured.iter().any(|a| &a.email == *email))
            .count();
        if unconfigured > 0 {
            info!(
                unconfigured,
                "dropping cached sessions for accounts no longer configured"
            );
        }

        *accounts = refreshed;
        self.persist(&accounts).await;
        self.publish(&accounts).await;

        let loaded = accounts.len();
        metrics::gauge!("pool_accounts_loaded").set(loaded as f64);
        info!(
            accounts = loaded,
            configured = configured.len(),
            "session initialization complete"
        );
        loaded
    }

    /// Cache-first authentication for a single account.
    async fn authenticate(
        &self,
        account: &AccountCredentials,
        cached: Option<&CachedSession>,
    ) -> Option<CachedSession> {
        let email = account.email.as_str();

        if let Some(cached) = cached {
            match self.identity.verify_credit(&cached.session_token).await {
                Ok(credit) => {
                    info!(email, credit, "cached session still valid");
                    return Some(CachedSession {
                        session_token: cached.session_token.clone(),
                        credit,
                    });
                }
                Err(e) => {
                    info!(email, error = %e, "cached session rejected, logging in again");
                }
            }
        }

        let session_token = match self.identity.login(email, account.password.expose()).await {
            Ok(token) => token,
            Err(e) => {
                warn!(email, error = %e, "login failed");
                return None;
            }
        };

        match self.identity.verify_credit(&session_token).await {
            Ok(credit) => {
                info!(email, credit, "login succeeded");
                Some(CachedSession {
                    session_token,
                    credit,
                })
            }
            Err(e) => {
                warn!(email, error = %e, "login succeeded but credit lookup failed");
                None
            }
        }
    }

    /// Pick an account whose credit covers `cost`, uniformly at random.
    ///
    /// `None` means no account can afford the request right now.
    pub async fn get_available_account(&self, cost: i64) -> Option<AccountRecord> {
        let candidates: Vec<AccountRecord> = {
            let accounts = self.snapshot().await;
            accounts
                .iter()
                .filter(|(_, session)| session.credit >= cost)
                .map(|(email, session)| AccountRecord::from_session(email, session))
                .collect()
        };

        if candidates.is_empty() {
            debug!(cost, "no account has enough credit");
            return None;
        }

        let index = rand::rng().random_range(0..candidates.len());
        candidates.into_iter().nth(index)
    }

    /// Debit `cost` from an account and persist the cache.
    ///
    /// The balance is allowed to go negative. An unknown email is ignored, but
    /// the cache is still written.
    pub async fn update_credit(&self, email: &str, cost: i64) {
        let mut accounts = self.accounts.lock().await;
        match accounts.get_mut(email) {
            Some(session) => {
                session.credit = session.credit.saturating_sub(cost);
                metrics::counter!("pool_credit_debited_total").increment(cost.max(0) as u64);
                debug!(email, cost, remaining = session.credit, "debited credit");
            }
            None => {
                debug!(email, cost, "debit for unknown account ignored");
            }
        }
        self.persist(&accounts).await;
        self.publish(&accounts).await;
    }

    /// Number of loaded accounts, whatever their balance.
    pub async fn available_account_count(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Whether any account is loaded.
    pub async fn is_available(&self) -> bool {
        self.available_account_count().await > 0
    }

    /// Look up a single account.
    pub async fn account(&self, email: &str) -> Option<AccountRecord> {
        let accounts = self.snapshot().await;
        accounts
            .get(email)
            .map(|session| AccountRecord::from_session(email, session))
    }

    /// Snapshot of every loaded account, sorted by email.
    pub async fn accounts(&self) -> Vec<AccountRecord> {
        let accounts = self.snapshot().await;
        let mut records: Vec<AccountRecord> = accounts
            .iter()
            .map(|(email, session)| AccountRecord::from_session(email, session))
            .collect();
        records.sort_by(|a, b| a.email.cmp(&b.email));
        records
    }

    /// Pool counts relative to a request cost.
    pub async fn summary(&self, cost: i64) -> PoolSummary {
        let accounts = self.snapshot().await;
        PoolSummary {
            accounts_total: accounts.len(),
            accounts_usable: accounts.values().filter(|s| s.credit >= cost).count(),
            cost,
            credit_total: accounts.values().map(|s| s.credit).sum(),
        }
    }

    /// Write the current state to the cache, reporting failure to the caller.
    pub async fn save(&self) -> Result<()> {
        let accounts = self.accounts.lock().await;
        self.cache.write(&accounts).await?;
        Ok(())
    }

    async fn snapshot(&self) -> Arc<SessionMap> {
        self.published.read().await.clone()
    }

    /// Replace the snapshot readers see. Called with the write lock held.
    async fn publish(&self, accounts: &SessionMap) {
        *self.published.write().await = Arc::new(accounts.clone());
    }

    /// Write the cache while the caller holds the lock. Failures are logged only.
    async fn persist(&self, accounts: &HashMap<String, CachedSession>) {
        if let Err(e) = self.cache.write(accounts).await {
            warn!(
                path = %self.cache.path().display(),
                error = %e,
                "failed to persist session cache, keeping in-memory state"
            );
        }
    }
}

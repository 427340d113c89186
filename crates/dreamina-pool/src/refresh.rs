//! Periodic session re-initialization
//!
//! Accounts that failed at startup stay out of the pool until the next
//! initialization, and credit balances only move when we debit them. This
//! task re-runs `initialize_sessions` on an interval so revived accounts come
//! back and balances track upstream top-ups.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::store::{AccountCredentials, SessionStore};

/// Spawn a background task that re-initializes the store every `interval`.
///
/// The first tick is skipped since startup has just initialized the store.
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_refresh_task(
    store: Arc<SessionStore>,
    accounts: Vec<AccountCredentials>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            debug!(accounts = accounts.len(), "refreshing account sessions");
            let usable = store.initialize_sessions(&accounts).await;
            info!(usable, "periodic session refresh finished");
        }
    })
}

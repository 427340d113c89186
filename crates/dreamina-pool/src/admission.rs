//! Per-user admission gate
//!
//! Bounds how many requests a single end user can have in flight. Each user
//! gets one semaphore, created on first use and kept for the life of the
//! process. Creation is double-checked under a write lock so concurrent first
//! requests from the same user always share one semaphore.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};

/// A held admission slot. The slot goes back to the user's counter when this
/// is dropped, whether the request finished, failed or was cancelled.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

/// Lazily populated map of per-user concurrency counters.
pub struct AdmissionGate {
    max_per_user: usize,
    counters: RwLock<HashMap<String, Arc<Semaphore>>>,
}

impl AdmissionGate {
    /// Gate allowing `max_per_user` concurrent slots per user (at least one).
    pub fn new(max_per_user: usize) -> Self {
        Self {
            max_per_user: max_per_user.max(1),
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_per_user(&self) -> usize {
        self.max_per_user
    }

    /// Wait for a free slot for `user_id`.
    ///
    /// No timeout: the caller is suspended until one of the user's earlier
    /// slots is released. Waiters resume in the semaphore's FIFO order.
    pub async fn acquire(&self, user_id: &str) -> Result<AdmissionSlot> {
        let counter = self.counter(user_id).await;
        let permit = counter
            .acquire_owned()
            .await
            .map_err(|_| Error::GateClosed(user_id.to_string()))?;
        debug!(user_id, "admission slot acquired");
        Ok(AdmissionSlot { _permit: permit })
    }

    /// Free slots for a user. Users never seen before have the full allowance.
    #[cfg(test)]
    async fn available_slots(&self, user_id: &str) -> usize {
        match self.counters.read().await.get(user_id) {
            Some(counter) => counter.available_permits(),
            None => self.max_per_user,
        }
    }

    /// Number of users that have been admitted at least once.
    pub async fn tracked_users(&self) -> usize {
        self.counters.read().await.len()
    }

    /// Look up the user's counter, creating it under the write lock if absent.
    async fn counter(&self, user_id: &str) -> Arc<Semaphore> {
        if let Some(counter) = self.counters.read().await.get(user_id) {
            return counter.clone();
        }

        let mut counters = self.counters.write().await;
        counters
            .entry(user_id.to_string())
            .or_insert_with(|| {
                debug!(user_id, max = self.max_per_user, "created admission counter");
                Arc::new(Semaphore::new(self.max_per_user))
            })
            .clone()
    }
}

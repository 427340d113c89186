//! Account pool for Dreamina image generation
//!
//! Holds every configured upstream account with its session token and credit
//! balance, picks an account that can afford a request, and debits it once the
//! paid call succeeds. A separate admission gate bounds how many requests one
//! end user may have in flight.
//!
//! Account lifecycle:
//! 1. Startup calls `SessionStore::initialize_sessions` with the configured logins
//! 2. Cached session verified upstream → credit refreshed, token kept
//! 3. Cache miss or rejected token → fresh login, then credit lookup
//! 4. Both paths fail → account left out until the next initialization
//! 5. `get_available_account(cost)` picks uniformly among accounts with enough credit
//! 6. `update_credit(email, cost)` debits after a successful generation and persists
//! 7. Optional background task re-runs initialization on an interval

pub mod admission;
pub mod error;
pub mod refresh;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use admission::{AdmissionGate, AdmissionSlot};
pub use error::{Error, Result};
pub use refresh::spawn_refresh_task;
pub use store::{AccountCredentials, AccountRecord, PoolSummary, SessionStore};

//! Dreamina account authentication library
//!
//! Talks to the upstream identity service on behalf of the account pool and
//! owns the on-disk session cache format. This crate has no knowledge of
//! account selection or credit accounting; it only answers "is this session
//! still good, and how much credit does it hold" and "give me a session for
//! these credentials".
//!
//! Session flow:
//! 1. Pool reads cached sessions via `cache::CacheFile::read()`
//! 2. Cached token is checked with `IdentityService::verify_credit()`
//! 3. On failure the pool calls `IdentityService::login()` with email + password
//! 4. The fresh token is verified once more to obtain the starting balance
//! 5. The updated mapping is persisted with `cache::CacheFile::write()`

pub mod cache;
pub mod constants;
pub mod error;
pub mod identity;
pub mod session;

pub use cache::{CacheFile, CachedSession, SessionMap};
pub use constants::*;
pub use error::{Error, Result};
pub use identity::{HttpIdentityService, IdentityService};
pub use session::{Endpoints, fetch_credit, login, parse_credit, session_cookie};

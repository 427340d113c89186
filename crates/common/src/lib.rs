//! Shared types for the Dreamina gateway workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;

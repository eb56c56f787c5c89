//! Crate-wide error taxonomy.
//!
//! Only the variants here are allowed to bubble out of [`crate::manager::ProcessingManager`]
//! to a caller as `Err` — per-target failures are recorded as
//! [`crate::domain::outcome::OutcomeRecord`] data, never propagated as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlockSweepError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("session rejected after recovery attempt: refresh the cookie jar at {cookie_path}")]
    Auth { cookie_path: String },

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, BlockSweepError>;

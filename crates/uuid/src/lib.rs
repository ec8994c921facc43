//! UUID and sharded-path utilities.
//!
//! CPR stores each care plan under a sharded directory derived from its identifier.
//!
//! To keep path derivation deterministic, identifiers use a *canonical* representation:
//! **32 lowercase hexadecimal characters** (no hyphens), the same value produced by
//! `Uuid::new_v4().simple().to_string()`.
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, records are stored under:
//! `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`
//!
//! Example:
//! `careplan_data/careplans/55/0e/550e8400e29b41d4a716446655440000/`

mod service;

pub use service::{ShardableUuid, Uuid};

/// Error type for UUID operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for UUID operations.
pub type UuidResult<T> = Result<T, UuidError>;

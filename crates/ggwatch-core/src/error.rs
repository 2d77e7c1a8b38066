//! Error types for the domain model.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("threshold must be a positive integer, got {0}")]
    InvalidThreshold(u64),

    #[error("unknown target kind: {0}")]
    UnknownTargetKind(String),

    #[error("not a map code or creator name: {0}")]
    InvalidIdentifier(String),
}

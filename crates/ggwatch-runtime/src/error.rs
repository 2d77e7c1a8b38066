//! Error types for the runtime collaborators.

use ggwatch_core::CoreError;
use thiserror::Error;

/// Failure of a data provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The map or creator does not exist upstream (possibly only for now).
    #[error("{0} not found")]
    NotFound(String),

    /// Transient failure: network, rate limit, timeout, bad payload.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

/// Failure to post a message through the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("integrity check failed: {0}")]
    Corrupt(String),

    #[error("session encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure of an interactive action that could not be shown to the user.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

//! Engine errors.

use thiserror::Error;

use crate::callback::CallbackError;

/// Errors raised by the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Error from the core taxonomy (conflicts, not-found, validation).
    #[error(transparent)]
    Core(#[from] converge_core::ConvergeError),

    /// Malformed selector signature.
    #[error("selector error: {0}")]
    Selector(#[from] converge_sfs::SfsError),

    /// Provider callback failure.
    #[error("callback error: {0}")]
    Callback(#[from] CallbackError),

    /// Operation referenced a kind no provider registered.
    #[error("unknown kind: {0}")]
    UnknownKind(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

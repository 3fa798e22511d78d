//! Selector language errors.

use thiserror::Error;

/// Errors raised while parsing a selector signature.
///
/// Signatures are validated when a provider registers its kinds, so a
/// malformed selector never surfaces at diff time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SfsError {
    /// Malformed selector signature.
    #[error("invalid selector at position {pos}: {message}")]
    Invalid {
        /// Byte offset of the offending character.
        pos: usize,
        /// Description of what the parser expected.
        message: String,
    },
}

/// Result type for selector operations.
pub type SfsResult<T> = Result<T, SfsError>;

//! Error types for retry execution

use thiserror::Error;

/// Invalid retry policy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Retry policy must allow at least one attempt")]
    ZeroAttempts,
}

/// Every attempt of an action failed.
///
/// Carries the error produced by the final attempt untouched, so callers keep
/// its full diagnostic detail.
#[derive(Debug, Error)]
#[error("{operation} failed after {attempts} attempt(s): {source}")]
pub struct ActionFailed<E> {
    operation: String,
    attempts: u32,
    #[source]
    source: E,
}

impl<E> ActionFailed<E> {
    pub(crate) fn new(operation: impl Into<String>, attempts: u32, source: E) -> Self {
        Self {
            operation: operation.into(),
            attempts,
            source,
        }
    }

    /// Name of the operation that was retried
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Number of times the action ran
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Error returned by the final attempt
    pub fn last_error(&self) -> &E {
        &self.source
    }

    /// Unwrap the final attempt's error
    pub fn into_inner(self) -> E {
        self.source
    }
}

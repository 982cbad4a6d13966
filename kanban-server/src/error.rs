//! Error taxonomy shared by the engine, the identity provider, and the
//! project service.

use kanban_proto::validation::ValidationError;

use crate::store::StoreError;

/// Errors returned by board, project, and auth operations.
///
/// Missing and non-owned resources are both reported as [`BoardError::NotFound`]
/// so callers cannot discover ids they do not own.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    /// The resource does not exist or belongs to someone else.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A unique key is already taken.
    #[error("{0}")]
    Conflict(String),

    /// Malformed input, rejected before any store work.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Missing, unknown, or expired credential, or failed login.
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// The store aborted the transaction (lock contention or a row vanished
    /// mid-operation). Nothing was committed; the caller may retry.
    #[error("the board changed concurrently, please retry: {0}")]
    Transaction(String),

    /// Any other store failure.
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BoardError {
    fn from(err: StoreError) -> Self {
        if err.is_contention() {
            Self::Transaction(err.to_string())
        } else {
            Self::Store(err)
        }
    }
}

impl BoardError {
    /// Returns `true` if retrying the whole operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

//! Crate-wide error taxonomy.
//!
//! Mirrors the classification in the design: `NotFound` is handled by
//! controllers as "nothing to do", `Conflict` and `Transient` are the only
//! two outcomes a `Reconcile` is allowed to return as an error (everything
//! else is encoded into the resource's own `phase`/`message` fields).

use thiserror::Error;

/// Error returned by a controller's `reconcile`. The work queue's only
/// semantic is: an `Err` here means retry, `Ok` means the state machine
/// advanced (possibly to a terminal or semi-terminal phase).
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("conflicting concurrent update, retry with a fresh read: {0}")]
    Conflict(String),

    #[error("transient adapter failure: {0}")]
    Transient(#[from] anyhow::Error),
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

impl From<crate::store::StoreError> for ReconcileError {
    fn from(err: crate::store::StoreError) -> Self {
        match err {
            crate::store::StoreError::Conflict { .. } => ReconcileError::Conflict(err.to_string()),
            other => ReconcileError::Transient(anyhow::anyhow!(other)),
        }
    }
}

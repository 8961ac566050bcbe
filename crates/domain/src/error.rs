//! Service-level error type.

use model::{OrderError, ProductError};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the services.
///
/// Business-rule violations keep their own enums; this type adds the
/// cross-cutting cases (authorization, missing documents, storage).
#[derive(Debug, Error)]
pub enum DomainError {
    /// Order business-rule violation.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Product business-rule violation.
    #[error(transparent)]
    Product(#[from] ProductError),

    /// Entity does not exist.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    /// The actor is not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DomainError {
    pub(crate) fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }
}

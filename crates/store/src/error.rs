//! Store error types.

use common::ProductId;
use thiserror::Error;

/// Errors from the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document with that id in the collection.
    #[error("{collection} document not found: {id}")]
    NotFound {
        collection: &'static str,
        id: String,
    },

    /// A document with that id already exists.
    #[error("{collection} document already exists: {id}")]
    Duplicate {
        collection: &'static str,
        id: String,
    },

    /// A user with that email already exists.
    #[error("Email already registered: {email}")]
    DuplicateEmail { email: String },

    /// Version-conditioned write lost a race; reload and retry.
    #[error("Version conflict on {collection} document {id}")]
    VersionConflict {
        collection: &'static str,
        id: String,
    },

    /// Conditional stock adjustment would drive the count negative.
    #[error("Stock conflict on product {product_id}: {available} available, {requested} requested")]
    StockConflict {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Database failure, safe for the caller to retry.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Document (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

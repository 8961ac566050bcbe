//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;
use model::{OrderError, ProductError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No authenticated actor on the request.
    Unauthorized(String),
    /// Service-level error.
    Domain(DomainError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, error_body(msg)),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg))
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

fn error_body(message: impl Into<String>) -> serde_json::Value {
    serde_json::json!({ "error": message.into() })
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, serde_json::Value) {
    match &err {
        DomainError::Order(order_err) => match order_err {
            OrderError::EmptyOrder
            | OrderError::InvalidShippingAddress
            | OrderError::InvalidPaymentMethod { .. }
            | OrderError::InvalidQuantity { .. }
            | OrderError::NegativeCharge { .. }
            | OrderError::PriceMismatch { .. } => (StatusCode::BAD_REQUEST, error_body(err.to_string())),
            OrderError::ProductNotFound { .. } | OrderError::ItemNotFound { .. } => {
                (StatusCode::NOT_FOUND, error_body(err.to_string()))
            }
            OrderError::NothingToReorder { unavailable } => (
                StatusCode::CONFLICT,
                serde_json::json!({
                    "error": err.to_string(),
                    "unavailable_items": unavailable
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                }),
            ),
            OrderError::OutOfStock { .. }
            | OrderError::AlreadyPaid
            | OrderError::AlreadyDelivered
            | OrderError::CannotDeliverUnpaid
            | OrderError::AlreadyCanceled
            | OrderError::CannotCancelDelivered
            | OrderError::CannotModifyDeliveredOrder => {
                (StatusCode::CONFLICT, error_body(err.to_string()))
            }
        },
        DomainError::Product(product_err) => match product_err {
            ProductError::InvalidRating { .. } | ProductError::InvalidPrice { .. } => {
                (StatusCode::BAD_REQUEST, error_body(err.to_string()))
            }
            ProductError::AlreadyReviewed { .. } => {
                (StatusCode::CONFLICT, error_body(err.to_string()))
            }
            ProductError::ReviewNotFound { .. } => {
                (StatusCode::NOT_FOUND, error_body(err.to_string()))
            }
        },
        DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, error_body(err.to_string())),
        DomainError::Forbidden(_) => (StatusCode::FORBIDDEN, error_body(err.to_string())),
        DomainError::Store(StoreError::VersionConflict { .. }) => {
            (StatusCode::CONFLICT, error_body(err.to_string()))
        }
        DomainError::Store(store_err) => {
            tracing::error!(error = %store_err, "storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal server error"),
            )
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

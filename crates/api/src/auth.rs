//! Actor extraction from forwarded identity headers.
//!
//! Authentication happens upstream; the gateway forwards the authenticated
//! identity in headers and this extractor only reads them. Requests without
//! an identity are rejected with 401.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use model::Actor;

use crate::error::ApiError;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the admin flag (`"true"` grants admin).
pub const ADMIN_HEADER: &str = "x-user-admin";

/// The authenticated caller, extracted from the forwarded identity headers.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing identity".to_string()))?
            .to_str()
            .map_err(|_| ApiError::Unauthorized("Malformed identity header".to_string()))?;

        let id = UserId::parse(raw)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid user id: {e}")))?;

        let is_admin = parts
            .headers
            .get(ADMIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "true");

        Ok(Identity(Actor { id, is_admin }))
    }
}

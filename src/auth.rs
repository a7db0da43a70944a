//! Consumed identity and store context.
//!
//! This service never authenticates anyone. The upstream gateway terminates
//! authentication and forwards an opaque principal id in `x-user-id`; the
//! storefront likewise resolves the tenant and forwards `x-store-id`. Both
//! are extracted here and threaded explicitly into every operation; there is
//! no ambient current-user or current-store state.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const STORE_ID_HEADER: &str = "x-store-id";

/// Authenticated principal, always present for customer-facing operations.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: Uuid,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized(format!("missing or invalid {} header", USER_ID_HEADER))
            })?;
        Ok(Principal { user_id })
    }
}

/// Resolved store (tenant) context for the request.
#[derive(Debug, Clone, Copy)]
pub struct StoreContext {
    pub store_id: Uuid,
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for StoreContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let store_id = parts
            .headers
            .get(STORE_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::ValidationError("store context could not be resolved".to_string())
            })?;
        Ok(StoreContext { store_id })
    }
}

//! Principal extraction.
//!
//! Credentials are verified by the gateway in front of this service, which
//! forwards the caller as `X-Principal-Id` and a comma-separated
//! `X-Principal-Roles`. The middleware turns those headers into a
//! [`Principal`] in request extensions for downstream handlers.

use std::str::FromStr;

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::authorization::{Principal, PrincipalProvider};
use crate::models::enums::Role;

pub const PRINCIPAL_ID_HEADER: &str = "X-Principal-Id";
pub const PRINCIPAL_ROLES_HEADER: &str = "X-Principal-Roles";

/// Reads the principal forwarded by a trusted gateway.
pub struct HeaderPrincipalProvider;

impl PrincipalProvider for HeaderPrincipalProvider {
    type Request = HeaderMap;

    fn principal(&self, headers: &HeaderMap) -> Option<Principal> {
        let id = headers
            .get(PRINCIPAL_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())?;

        // Unknown role names grant nothing.
        let roles = headers
            .get(PRINCIPAL_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .split(',')
            .filter_map(|r| Role::from_str(&r.trim().to_lowercase()).ok());

        Some(Principal::new(id, roles))
    }
}

/// Reject requests without a principal; inject it otherwise.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_principal(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_principal_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_principal_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let principal = ctx
        .principals
        .principal(req.headers())
        .ok_or(ApiError::Unauthorized)?;

    tracing::debug!(
        principal = %principal.id,
        method = %req.method(),
        path = %req.uri().path(),
        "Request principal resolved"
    );

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

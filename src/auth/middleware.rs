//! Auth middleware for Axum routes.
//!
//! Validates JWT Bearer tokens and injects Claims into request extensions.
//! Implements deny-by-default: if `auth_config` is None, all requests are rejected.

use crate::api::handlers::{ApiState, AppError};
use crate::auth::jwt::decode_jwt;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Middleware that requires a valid JWT Bearer token.
///
/// 1. No `auth_config` → 403
/// 2. Missing or malformed `Authorization: Bearer` header → 401
/// 3. Bad signature, expired, or wrong audience → 401
/// 4. `allowed_email_domain` configured and not matched → 403
pub async fn require_auth(
    State(state): State<ApiState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_config = state.config.auth_config.as_ref().ok_or_else(|| {
        AppError::Forbidden("Authentication not configured, access denied".to_string())
    })?;

    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let claims = decode_jwt(
        token,
        &auth_config.jwt_secret,
        auth_config.jwt_audience.as_deref(),
    )
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

    if let Some(ref domain) = auth_config.allowed_email_domain {
        let allowed = claims
            .email
            .as_deref()
            .is_some_and(|email| email.ends_with(&format!("@{}", domain)));
        if !allowed {
            return Err(AppError::Forbidden(format!(
                "Email domain not allowed (expected @{})",
                domain
            )));
        }
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Tests
// ============================================================================

//! AuthUser extractor for Axum handlers.
//!
//! Extracts the authenticated user's identity from request extensions
//! (populated by the `require_auth` middleware).

use crate::api::handlers::{ApiState, AppError};
use crate::auth::jwt::Claims;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

/// Authenticated owner identity. Handlers pass `user_id` explicitly to every
/// manager and store call.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
}

impl AuthUser {
    fn from_claims(claims: &Claims) -> Result<Self, AppError> {
        let user_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid user ID in token".to_string()))?;

        Ok(Self {
            user_id,
            email: claims.email.clone(),
        })
    }
}

impl FromRequestParts<ApiState> for AuthUser {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &ApiState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async {
            let claims = parts.extensions.get::<Claims>().ok_or_else(|| {
                AppError::Unauthorized("Authentication required, no claims in request".to_string())
            })?;

            Self::from_claims(claims)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str) -> Claims {
        Claims {
            sub: sub.to_string(),
            email: Some("alice@example.com".to_string()),
            aud: None,
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn test_auth_user_from_valid_claims() {
        let user_id = Uuid::new_v4();
        let user = AuthUser::from_claims(&claims(&user_id.to_string())).unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.email.as_deref(), Some("alice@example.com"));
    }

    #[test]
    fn test_auth_user_from_invalid_uuid() {
        assert!(AuthUser::from_claims(&claims("not-a-uuid")).is_err());
    }
}

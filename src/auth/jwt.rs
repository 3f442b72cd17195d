//! JWT decoding for bearer tokens issued by the identity provider.
//!
//! Tokens are HS256-signed with a shared secret. The `sub` claim carries the
//! user's UUID; `email` and `aud` are optional. When an audience is
//! configured it is enforced, otherwise the `aud` claim is ignored.

use anyhow::{Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user UUID
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default)]
    pub iat: i64,
    pub exp: i64,
}

/// Encode a token for the given user. Used by tests and local tooling.
pub fn encode_jwt(
    user_id: Uuid,
    email: Option<&str>,
    audience: Option<&str>,
    secret: &str,
    expiry_secs: u64,
) -> Result<String> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.map(str::to_string),
        aud: audience.map(str::to_string),
        iat: now,
        exp: now + expiry_secs as i64,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("Failed to encode JWT")
}

/// Decode and validate a token: signature, expiry, and audience when one is given.
pub fn decode_jwt(token: &str, secret: &str, audience: Option<&str>) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    match audience {
        Some(aud) => validation.set_audience(&[aud]),
        None => validation.validate_aud = false,
    }

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .context("Failed to decode JWT")?;

    Ok(token_data.claims)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-minimum-32-chars!!";

    #[test]
    fn test_encode_decode_roundtrip() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(user_id, Some("alice@example.com"), None, TEST_SECRET, 3600)
            .expect("encode should succeed");

        let claims = decode_jwt(&token, TEST_SECRET, None).expect("decode should succeed");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email.as_deref(), Some("alice@example.com"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let user_id = Uuid::new_v4();
        let token = encode_jwt(
            user_id,
            None,
            Some("authenticated"),
            TEST_SECRET,
            3600,
        )
        .unwrap();

        assert!(decode_jwt(&token, TEST_SECRET, Some("authenticated")).is_ok());
        assert!(decode_jwt(&token, TEST_SECRET, Some("other")).is_err());
        // Audience ignored when none is configured
        assert!(decode_jwt(&token, TEST_SECRET, None).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: None,
            aud: None,
            iat: now - 7200,
            exp: now - 3600,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .expect("encode should succeed");

        assert!(decode_jwt(&token, TEST_SECRET, None).is_err());
    }

    #[test]
    fn test_provider_extra_claims_ignored() {
        let now = chrono::Utc::now().timestamp();
        let user_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "sub": user_id.to_string(),
            "role": "authenticated",
            "app_metadata": { "provider": "google" },
            "iat": now,
            "exp": now + 600,
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &payload,
            &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
        )
        .unwrap();

        let claims = decode_jwt(&token, TEST_SECRET, None).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
        assert!(claims.email.is_none());
    }

    #[test]
    fn test_invalid_secret_rejected() {
        let token = encode_jwt(Uuid::new_v4(), None, None, TEST_SECRET, 3600).unwrap();
        let result = decode_jwt(&token, "wrong-secret-that-is-also-32chars!", None);
        assert!(result.is_err(), "wrong secret should be rejected");
    }

    #[test]
    fn test_malformed_token_rejected() {
        assert!(decode_jwt("not.a.valid.jwt", TEST_SECRET, None).is_err());
        assert!(decode_jwt("", TEST_SECRET, None).is_err());
    }
}

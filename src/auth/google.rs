//! Google OAuth token lifecycle.
//!
//! Stored access tokens are reused until they are within five minutes of
//! expiry; past that the refresh token is exchanged for a new one and the
//! result is persisted on the connection.

use crate::google::GoogleApi;
use crate::neo4j::models::ConnectionNode;
use crate::neo4j::traits::RecordStore;
use crate::GoogleConfig;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Refresh this long before the stored expiry
pub const REFRESH_BUFFER_MINUTES: i64 = 5;

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Reauthentication required: {0}")]
    ReauthenticationRequired(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct TokenManager {
    store: Arc<dyn RecordStore>,
    google: Arc<dyn GoogleApi>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn RecordStore>, google: Arc<dyn GoogleApi>, config: &GoogleConfig) -> Self {
        Self {
            store,
            google,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// True when the stored token expires within the refresh buffer
    pub fn needs_refresh(conn: &ConnectionNode, now: DateTime<Utc>) -> bool {
        match conn.token_expires_at {
            None => false,
            Some(expires_at) => expires_at <= now + Duration::minutes(REFRESH_BUFFER_MINUTES),
        }
    }

    /// A usable access token for the connection, refreshing it if needed
    pub async fn access_token(&self, conn: &ConnectionNode) -> Result<String, TokenError> {
        let now = Utc::now();
        if !Self::needs_refresh(conn, now) {
            return Ok(conn.access_token.clone());
        }

        let refresh_token = conn.refresh_token.as_deref().ok_or_else(|| {
            TokenError::ReauthenticationRequired("No refresh token stored".to_string())
        })?;

        let client_id = conn
            .metadata_str("client_id")
            .map(str::to_string)
            .or_else(|| self.client_id.clone());
        let client_secret = conn
            .metadata_str("client_secret")
            .map(str::to_string)
            .or_else(|| self.client_secret.clone());
        let (Some(client_id), Some(client_secret)) = (client_id, client_secret) else {
            return Err(TokenError::ReauthenticationRequired(
                "No OAuth client credentials available".to_string(),
            ));
        };

        tracing::info!(connection_id = %conn.id, "Refreshing Google access token");
        let refreshed = self
            .google
            .refresh_access_token(&client_id, &client_secret, refresh_token)
            .await
            .map_err(|e| {
                if e.to_string().contains("invalid_grant") {
                    TokenError::ReauthenticationRequired("Refresh token revoked".to_string())
                } else {
                    TokenError::Other(e)
                }
            })?;

        let expires_at =
            now + Duration::seconds(refreshed.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS));
        self.store
            .update_connection_tokens(conn.id, &refreshed.access_token, expires_at)
            .await?;

        Ok(refreshed.access_token)
    }
}

// ============================================================================
// Tests
// ============================================================================

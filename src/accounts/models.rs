//! Account request and response types

use crate::neo4j::models::{ConnectionNode, UserNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default provider for OAuth connections
pub const DEFAULT_PROVIDER: &str = "google";

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateUserResponse {
    #[serde(flatten)]
    pub user: UserNode,
    pub created: bool,
}

/// Store (or refresh) the tokens of an OAuth grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveConnectionRequest {
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub provider_email: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Callback payload creating the user and storing the grant in one call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteOAuthRequest {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default = "default_provider")]
    pub provider: String,
    pub provider_user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteOAuthResponse {
    pub user_id: Uuid,
    pub user_created: bool,
    pub connection: ConnectionNode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_oauth_defaults() {
        let json = format!(
            r#"{{"user_id":"{}","email":"a@example.com","provider_user_id":"g-1","access_token":"tok"}}"#,
            Uuid::new_v4()
        );
        let req: CompleteOAuthRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.provider, "google");
        assert!(req.scopes.is_empty());
        assert!(req.token_expires_at.is_none());
        assert!(req.metadata.is_none());
    }
}

//! Account operations: users and OAuth connections

use super::error::{AccountError, AccountResult};
use super::models::*;
use crate::neo4j::models::{ConnectionNode, UserNode};
use crate::neo4j::traits::RecordStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct AccountManager {
    store: Arc<dyn RecordStore>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn ensure_self(caller: Uuid, user_id: Uuid) -> AccountResult<()> {
        if caller != user_id {
            return Err(AccountError::Forbidden(
                "Cannot act on behalf of another user".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the caller's user record. Idempotent: an existing user is
    /// returned unchanged with `created = false`.
    pub async fn create_user(
        &self,
        caller: Uuid,
        req: CreateUserRequest,
    ) -> AccountResult<CreateUserResponse> {
        Self::ensure_self(caller, req.id)?;
        if req.email.trim().is_empty() {
            return Err(AccountError::Validation("Email is required".to_string()));
        }

        let now = Utc::now();
        let user = UserNode {
            id: req.id,
            email: req.email,
            name: req.name,
            avatar_url: req.avatar_url,
            created_at: now,
            updated_at: now,
        };
        let created = self.store.create_user(&user).await?;
        if created {
            tracing::info!(user_id = %user.id, "Created user");
        }

        let user = match self.store.get_user(user.id).await? {
            Some(stored) => stored,
            None => user,
        };
        Ok(CreateUserResponse { user, created })
    }

    /// Store an OAuth grant, updating the existing one for the same
    /// provider account
    pub async fn save_connection(
        &self,
        caller: Uuid,
        req: SaveConnectionRequest,
    ) -> AccountResult<ConnectionNode> {
        Self::ensure_self(caller, req.user_id)?;
        let conn = Self::connection_from(
            req.user_id,
            req.provider,
            req.provider_user_id,
            req.provider_email,
            req.access_token,
            req.refresh_token,
            req.token_expires_at,
            req.scopes,
            req.metadata,
        )?;

        let stored = self.store.upsert_connection(&conn).await?;
        tracing::info!(
            user_id = %stored.user_id,
            connection_id = %stored.id,
            provider = %stored.provider,
            "Saved OAuth connection"
        );
        Ok(stored)
    }

    pub async fn list_connections(&self, caller: Uuid) -> AccountResult<Vec<ConnectionNode>> {
        Ok(self.store.list_connections(caller).await?)
    }

    pub async fn revoke_connection(&self, caller: Uuid, connection_id: Uuid) -> AccountResult<()> {
        if !self.store.deactivate_connection(caller, connection_id).await? {
            return Err(AccountError::NotFound);
        }
        tracing::info!(user_id = %caller, %connection_id, "Revoked OAuth connection");
        Ok(())
    }

    /// Create or refresh the user, then upsert the connection
    pub async fn complete_oauth(
        &self,
        caller: Uuid,
        req: CompleteOAuthRequest,
    ) -> AccountResult<CompleteOAuthResponse> {
        Self::ensure_self(caller, req.user_id)?;

        let now = Utc::now();
        let user = UserNode {
            id: req.user_id,
            email: req.email.clone(),
            name: req.name.clone(),
            avatar_url: req.avatar_url.clone(),
            created_at: now,
            updated_at: now,
        };
        let user_created = self.store.create_user(&user).await?;
        if !user_created {
            self.store
                .update_user_profile(req.user_id, req.name, req.avatar_url)
                .await?;
        }

        let token_expires_at = match req.token_expires_at {
            Some(at) => Some(at),
            None if !req.access_token.is_empty() => Some(now + Duration::hours(1)),
            None => None,
        };

        let conn = Self::connection_from(
            req.user_id,
            req.provider,
            req.provider_user_id,
            Some(req.email),
            req.access_token,
            req.refresh_token,
            token_expires_at,
            req.scopes,
            req.metadata,
        )?;
        let connection = self.store.upsert_connection(&conn).await?;

        tracing::info!(
            user_id = %req.user_id,
            user_created,
            connection_id = %connection.id,
            "Completed OAuth flow"
        );
        Ok(CompleteOAuthResponse {
            user_id: req.user_id,
            user_created,
            connection,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn connection_from(
        user_id: Uuid,
        provider: String,
        provider_user_id: String,
        provider_email: Option<String>,
        access_token: String,
        refresh_token: Option<String>,
        token_expires_at: Option<chrono::DateTime<Utc>>,
        scopes: Vec<String>,
        metadata: Option<serde_json::Value>,
    ) -> AccountResult<ConnectionNode> {
        if provider.trim().is_empty() || provider_user_id.trim().is_empty() {
            return Err(AccountError::Validation(
                "provider and provider_user_id are required".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(ConnectionNode {
            id: Uuid::new_v4(),
            user_id,
            provider,
            provider_user_id,
            provider_email,
            access_token,
            refresh_token,
            token_expires_at,
            scopes,
            is_active: true,
            metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
            last_synced: None,
            created_at: now,
            updated_at: now,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::MemoryStore;

    fn setup() -> (AccountManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (AccountManager::new(store.clone()), store)
    }

    fn oauth(user_id: Uuid) -> CompleteOAuthRequest {
        CompleteOAuthRequest {
            user_id,
            email: "alice@example.com".into(),
            name: Some("Alice".into()),
            avatar_url: None,
            provider: DEFAULT_PROVIDER.into(),
            provider_user_id: "google-123".into(),
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            token_expires_at: None,
            scopes: vec!["email".into()],
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent() {
        let (accounts, _) = setup();
        let id = Uuid::new_v4();
        let req = CreateUserRequest {
            id,
            email: "alice@example.com".into(),
            name: Some("Alice".into()),
            avatar_url: None,
        };

        let first = accounts.create_user(id, req.clone()).await.unwrap();
        assert!(first.created);

        let mut renamed = req;
        renamed.name = Some("Other".into());
        let second = accounts.create_user(id, renamed).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.user.name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_cannot_act_for_another_user() {
        let (accounts, _) = setup();
        let err = accounts
            .complete_oauth(Uuid::new_v4(), oauth(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_complete_oauth_creates_then_updates() {
        let (accounts, store) = setup();
        let id = Uuid::new_v4();

        let first = accounts.complete_oauth(id, oauth(id)).await.unwrap();
        assert!(first.user_created);
        let expires = first.connection.token_expires_at.unwrap();
        assert!(expires > Utc::now() + Duration::minutes(55));
        assert_eq!(
            first.connection.provider_email.as_deref(),
            Some("alice@example.com")
        );

        let mut again = oauth(id);
        again.name = Some("Alice B".into());
        again.access_token = "access-2".into();
        let second = accounts.complete_oauth(id, again).await.unwrap();
        assert!(!second.user_created);
        assert_eq!(second.connection.id, first.connection.id);
        assert_eq!(second.connection.access_token, "access-2");

        let user = store.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.name.as_deref(), Some("Alice B"));
        assert_eq!(store.list_connections(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_only_own_connection() {
        let (accounts, _) = setup();
        let id = Uuid::new_v4();
        let done = accounts.complete_oauth(id, oauth(id)).await.unwrap();

        let err = accounts
            .revoke_connection(Uuid::new_v4(), done.connection.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::NotFound));

        accounts
            .revoke_connection(id, done.connection.id)
            .await
            .unwrap();
        let conns = accounts.list_connections(id).await.unwrap();
        assert!(!conns[0].is_active);

        // Saving the grant again re-activates it
        let saved = accounts
            .save_connection(
                id,
                SaveConnectionRequest {
                    user_id: id,
                    provider: "google".into(),
                    provider_user_id: "google-123".into(),
                    provider_email: None,
                    access_token: "access-3".into(),
                    refresh_token: None,
                    token_expires_at: None,
                    scopes: vec![],
                    metadata: None,
                },
            )
            .await
            .unwrap();
        assert!(saved.is_active);
        assert_eq!(saved.id, done.connection.id);
    }
}

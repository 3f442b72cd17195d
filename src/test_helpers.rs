//! Test helper factories and mock state builders
//!
//! Provides a scripted [`GoogleApi`] fake, fixture records with sensible
//! defaults, and helpers for building mock API state over the in-memory store.
#![allow(dead_code)]

use crate::api::handlers::{ApiState, ServerState};
use crate::google::*;
use crate::neo4j::models::*;
use crate::neo4j::traits::RecordStore;
use crate::neo4j::MemoryStore;
use crate::sync::SyncService;
use crate::{AuthConfig, Config, GoogleConfig, StoreBackend, WebhookConfig};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-secret-key-minimum-32-chars!!";
pub const FIXTURE_EMAIL: &str = "alice@example.com";

// ============================================================================
// Config and state builders
// ============================================================================

/// Auth config with a fixed secret and no audience or domain restriction
pub fn test_auth_config() -> AuthConfig {
    AuthConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_audience: None,
        allowed_email_domain: None,
    }
}

pub fn test_config(auth_config: Option<AuthConfig>) -> Config {
    Config {
        server_port: 0,
        public_url: "https://bff.test".to_string(),
        api_env: "test".to_string(),
        allowed_origins: vec!["http://localhost:3000".to_string()],
        store_backend: StoreBackend::Memory,
        neo4j_uri: "bolt://mock:7687".to_string(),
        neo4j_user: "neo4j".to_string(),
        neo4j_password: "mock".to_string(),
        auth_config,
        google: GoogleConfig {
            client_id: Some("test-client-id".to_string()),
            client_secret: Some("test-client-secret".to_string()),
            project_id: Some("test-project".to_string()),
            ..Default::default()
        },
        webhooks: WebhookConfig {
            channel_secret: Some("channel-secret".to_string()),
            pubsub_verification_token: Some("pubsub-token".to_string()),
        },
        cron_secret: Some("cron-secret".to_string()),
    }
}

/// API state over an empty in-memory store and a default Google fake
pub fn mock_api_state(auth_config: Option<AuthConfig>) -> (ApiState, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let google = Arc::new(FakeGoogleApi::default());
    let state = ServerState::new(store.clone(), google, Arc::new(test_config(auth_config)));
    (state, store)
}

/// Full `Authorization` header value for a fresh token
pub fn test_bearer_token(user_id: Uuid) -> String {
    let token = crate::auth::jwt::encode_jwt(user_id, Some(FIXTURE_EMAIL), None, TEST_JWT_SECRET, 3600)
        .expect("test token encoding should succeed");
    format!("Bearer {}", token)
}

// ============================================================================
// Fixture records
// ============================================================================

/// An active Google connection whose token is valid for another hour
pub fn sample_connection(user_id: Uuid) -> ConnectionNode {
    let now = Utc::now();
    ConnectionNode {
        id: Uuid::new_v4(),
        user_id,
        provider: "google".to_string(),
        provider_user_id: "google-123".to_string(),
        provider_email: Some(FIXTURE_EMAIL.to_string()),
        access_token: "stored-token".to_string(),
        refresh_token: Some("refresh-token".to_string()),
        token_expires_at: Some(now + Duration::hours(1)),
        scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        is_active: true,
        metadata: serde_json::json!({}),
        last_synced: None,
        created_at: now,
        updated_at: now,
    }
}

/// A minimal single-part Gmail message
pub fn gmail_message(id: &str, labels: &[&str]) -> GmailMessage {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "threadId": format!("thread-{}", id),
        "labelIds": labels,
        "snippet": "snippet",
        "internalDate": Utc::now().timestamp_millis().to_string(),
        "payload": {
            "mimeType": "text/plain",
            "headers": [{"name": "Subject", "value": format!("Message {}", id)}],
            "body": {"data": "aGVsbG8"}
        }
    }))
    .expect("fixture message should parse")
}

pub struct SyncFixture {
    pub store: Arc<MemoryStore>,
    pub google: Arc<FakeGoogleApi>,
    pub sync: SyncService,
    pub user_id: Uuid,
    pub connection_id: Uuid,
}

/// Sync service over a store holding one connected user
pub async fn sync_fixture() -> SyncFixture {
    let store = Arc::new(MemoryStore::new());
    let google = Arc::new(FakeGoogleApi::default());
    let user_id = Uuid::new_v4();
    let conn = store
        .upsert_connection(&sample_connection(user_id))
        .await
        .expect("fixture connection");
    let sync = SyncService::new(
        store.clone(),
        google.clone(),
        Arc::new(test_config(Some(test_auth_config()))),
    );
    SyncFixture {
        store,
        google,
        sync,
        user_id,
        connection_id: conn.id,
    }
}

// ============================================================================
// Scripted Google API
// ============================================================================

#[derive(Default)]
struct FakeState {
    refresh_calls: usize,
    calendar_items: Vec<serde_json::Value>,
    messages: Vec<GmailMessage>,
    missing_messages: Vec<String>,
    history: Option<HistoryList>,
    last_gmail_query: Option<String>,
    last_calendar_channel: Option<ChannelRequest>,
    gmail_watch_expiration: Option<DateTime<Utc>>,
    gmail_stop_calls: usize,
    fail_stops: bool,
    fail_gmail_watch: bool,
}

/// In-process [`GoogleApi`] returning scripted responses
#[derive(Default)]
pub struct FakeGoogleApi {
    state: Mutex<FakeState>,
}

impl FakeGoogleApi {
    fn with<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().expect("fake state lock");
        f(&mut state)
    }

    pub fn refresh_calls(&self) -> usize {
        self.with(|s| s.refresh_calls)
    }

    pub fn set_calendar_items(&self, items: Vec<serde_json::Value>) {
        self.with(|s| s.calendar_items = items);
    }

    pub fn add_message(&self, message: GmailMessage) {
        self.with(|s| s.messages.push(message));
    }

    /// Listed by the messages endpoint but failing on fetch
    pub fn add_missing_message(&self, id: &str) {
        self.with(|s| s.missing_messages.push(id.to_string()));
    }

    pub fn set_history(&self, history: serde_json::Value) {
        let list: HistoryList = serde_json::from_value(history).expect("history fixture");
        self.with(|s| s.history = Some(list));
    }

    pub fn last_gmail_query(&self) -> Option<String> {
        self.with(|s| s.last_gmail_query.clone())
    }

    pub fn last_calendar_channel(&self) -> Option<ChannelRequest> {
        self.with(|s| s.last_calendar_channel.clone())
    }

    pub fn set_gmail_watch_expiration(&self, at: DateTime<Utc>) {
        self.with(|s| s.gmail_watch_expiration = Some(at));
    }

    pub fn gmail_stop_calls(&self) -> usize {
        self.with(|s| s.gmail_stop_calls)
    }

    pub fn fail_stops(&self) {
        self.with(|s| s.fail_stops = true);
    }

    pub fn fail_gmail_watch(&self) {
        self.with(|s| s.fail_gmail_watch = true);
    }
}

#[async_trait]
impl GoogleApi for FakeGoogleApi {
    async fn refresh_access_token(
        &self,
        _client_id: &str,
        _client_secret: &str,
        _refresh_token: &str,
    ) -> Result<TokenRefresh> {
        self.with(|s| s.refresh_calls += 1);
        Ok(TokenRefresh {
            access_token: "refreshed-token".to_string(),
            expires_in: Some(3600),
        })
    }

    async fn list_calendar_events(
        &self,
        _access_token: &str,
        _query: &EventListQuery,
    ) -> Result<EventList> {
        Ok(EventList {
            items: self.with(|s| s.calendar_items.clone()),
            next_sync_token: Some("sync-token-2".to_string()),
        })
    }

    async fn calendar_sync_token(&self, _access_token: &str) -> Result<Option<String>> {
        Ok(Some("sync-token-1".to_string()))
    }

    async fn watch_calendar(
        &self,
        _access_token: &str,
        channel: &ChannelRequest,
    ) -> Result<ChannelResponse> {
        self.with(|s| s.last_calendar_channel = Some(channel.clone()));
        Ok(ChannelResponse {
            id: Some(channel.id.clone()),
            resource_id: Some("resource-1".to_string()),
            expiration: Some("1900000000000".to_string()),
        })
    }

    async fn stop_channel(
        &self,
        _access_token: &str,
        _channel_id: &str,
        _resource_id: Option<&str>,
    ) -> Result<()> {
        if self.with(|s| s.fail_stops) {
            return Err(anyhow!("Google channel stop failed (404): not found"));
        }
        Ok(())
    }

    async fn list_gmail_messages(
        &self,
        _access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<MessageList> {
        self.with(|s| {
            s.last_gmail_query = Some(query.to_string());
            let messages = s
                .messages
                .iter()
                .map(|m| m.id.clone())
                .chain(s.missing_messages.iter().cloned())
                .take(max_results as usize)
                .map(|id| MessageRef {
                    id,
                    thread_id: None,
                    label_ids: Vec::new(),
                })
                .collect();
            Ok(MessageList {
                messages,
                next_page_token: None,
            })
        })
    }

    async fn get_gmail_message(&self, _access_token: &str, id: &str) -> Result<GmailMessage> {
        self.with(|s| {
            s.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| anyhow!("Google Gmail message get failed (404): {}", id))
        })
    }

    async fn modify_gmail_message(
        &self,
        _access_token: &str,
        id: &str,
        add_label_ids: &[&str],
        remove_label_ids: &[&str],
    ) -> Result<GmailMessage> {
        self.with(|s| -> Result<GmailMessage> {
            let message = s
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .ok_or_else(|| anyhow!("Google Gmail message modify failed (404): {}", id))?;
            message
                .label_ids
                .retain(|l| !remove_label_ids.contains(&l.as_str()));
            for label in add_label_ids {
                if !message.label_ids.iter().any(|l| l == label) {
                    message.label_ids.push(label.to_string());
                }
            }
            Ok(GmailMessage {
                id: message.id.clone(),
                thread_id: message.thread_id.clone(),
                label_ids: message.label_ids.clone(),
                ..Default::default()
            })
        })
    }

    async fn watch_gmail(
        &self,
        _access_token: &str,
        _topic_name: &str,
        _label_ids: &[&str],
    ) -> Result<GmailWatchResponse> {
        self.with(|s| {
            if s.fail_gmail_watch {
                return Err(anyhow!("Google Gmail watch failed (403): topic not found"));
            }
            Ok(GmailWatchResponse {
                history_id: Some("1000".to_string()),
                expiration: s
                    .gmail_watch_expiration
                    .map(|at| at.timestamp_millis().to_string()),
            })
        })
    }

    async fn stop_gmail(&self, _access_token: &str) -> Result<()> {
        self.with(|s| {
            s.gmail_stop_calls += 1;
            if s.fail_stops {
                return Err(anyhow!("Google Gmail stop failed (500)"));
            }
            Ok(())
        })
    }

    async fn list_gmail_history(
        &self,
        _access_token: &str,
        _start_history_id: &str,
        _page_token: Option<&str>,
    ) -> Result<HistoryList> {
        self.with(|s| {
            s.history
                .clone()
                .ok_or_else(|| anyhow!("Google Gmail history list failed (404): history expired"))
        })
    }
}

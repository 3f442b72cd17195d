//! Push channel (watch) lifecycle

use super::{SyncError, SyncResult, SyncService};
use crate::google::ChannelRequest;
use crate::neo4j::models::{PushSubscriptionNode, WatchProvider};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Requested channel lifetime; Google caps both watch kinds at about a week
pub const WATCH_LIFETIME_DAYS: i64 = 7;

/// A freshly registered watch
#[derive(Debug, Clone, Serialize)]
pub struct WatchInfo {
    pub subscription_id: Uuid,
    pub provider: WatchProvider,
    pub channel_id: String,
    pub resource_id: Option<String>,
    pub history_id: Option<String>,
    pub sync_token: Option<String>,
    pub expiration: DateTime<Utc>,
}

/// Result of one watch in a batch setup
#[derive(Debug, Clone, Serialize)]
pub struct WatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SyncResult<WatchInfo>> for WatchOutcome {
    fn from(result: SyncResult<WatchInfo>) -> Self {
        match result {
            Ok(watch) => Self {
                success: true,
                watch: Some(watch),
                error: None,
            },
            Err(e) => Self {
                success: false,
                watch: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// One provider's current watch and every channel it ever had
#[derive(Debug, Clone, Serialize)]
pub struct ProviderWatchStatus {
    pub active: bool,
    pub watch: Option<PushSubscriptionNode>,
    pub history: Vec<PushSubscriptionNode>,
}

impl ProviderWatchStatus {
    fn from_history(history: Vec<PushSubscriptionNode>) -> Self {
        let watch = history.iter().find(|s| s.is_active).cloned();
        Self {
            active: watch.is_some(),
            watch,
            history,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchSummary {
    pub total_watches: usize,
    pub active_watches: usize,
    pub gmail_active: bool,
    pub calendar_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchStatus {
    pub user_id: Uuid,
    pub gmail: ProviderWatchStatus,
    pub calendar: ProviderWatchStatus,
    pub summary: WatchSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchSetupReport {
    pub user_id: Uuid,
    pub gmail: WatchOutcome,
    pub calendar: WatchOutcome,
}

/// Token attached to calendar channels: hex(HMAC-SHA256(secret, channel_id))
pub fn channel_token(secret: &str, channel_id: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(channel_id.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a channel token echoed back by Google
pub fn verify_channel_token(secret: &str, channel_id: &str, token: &str) -> bool {
    let Ok(expected) = hex::decode(token) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(channel_id.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn millis_to_datetime(ms: Option<&str>) -> Option<DateTime<Utc>> {
    ms.and_then(|s| s.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
}

impl SyncService {
    /// Register a new push channel, replacing any active one
    pub async fn start_watch(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> SyncResult<WatchInfo> {
        if self
            .store
            .get_active_subscription(user_id, provider)
            .await?
            .is_some()
        {
            tracing::info!(%user_id, %provider, "Replacing existing watch");
            if let Err(e) = self.stop_watch(user_id, provider).await {
                tracing::warn!(%user_id, %provider, "Could not stop existing watch: {}", e);
            }
        }

        let (conn, token) = self.authorized(user_id).await?;
        let channel_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let default_expiration = now + Duration::days(WATCH_LIFETIME_DAYS);

        let mut sub = PushSubscriptionNode {
            id: Uuid::new_v4(),
            user_id,
            connection_id: conn.id,
            provider,
            channel_id: channel_id.clone(),
            resource_id: None,
            history_id: None,
            sync_token: None,
            expiration: default_expiration,
            is_active: true,
            notification_count: 0,
            last_notification_at: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };

        match provider {
            WatchProvider::Gmail => {
                let topic = self.config.google.gmail_topic().ok_or_else(|| {
                    SyncError::NotConfigured(
                        "Gmail push requires google.project_id to be configured".to_string(),
                    )
                })?;
                let resp = self.google.watch_gmail(&token, &topic, &["INBOX"]).await?;
                sub.history_id = resp.history_id.clone();
                sub.expiration =
                    millis_to_datetime(resp.expiration.as_deref()).unwrap_or(default_expiration);
                sub.metadata = serde_json::json!({
                    "topic_name": topic,
                    "watch_response": {
                        "historyId": resp.history_id,
                        "expiration": resp.expiration,
                    },
                });
            }
            WatchProvider::Calendar => {
                let address = format!("{}/api/webhooks/calendar", self.config.public_url);
                let channel = ChannelRequest {
                    id: channel_id.clone(),
                    kind: "web_hook".to_string(),
                    address: address.clone(),
                    token: self
                        .config
                        .webhooks
                        .channel_secret
                        .as_deref()
                        .and_then(|secret| channel_token(secret, &channel_id)),
                    expiration: default_expiration.timestamp_millis(),
                };
                let resp = self.google.watch_calendar(&token, &channel).await?;
                sub.resource_id = resp.resource_id.clone();
                sub.expiration =
                    millis_to_datetime(resp.expiration.as_deref()).unwrap_or(default_expiration);
                sub.sync_token = match self.google.calendar_sync_token(&token).await {
                    Ok(sync_token) => sync_token,
                    Err(e) => {
                        tracing::warn!(%user_id, "Could not fetch calendar sync token: {}", e);
                        None
                    }
                };
                sub.metadata = serde_json::json!({
                    "webhook_url": address,
                    "watch_response": resp,
                });
            }
        }

        self.store.create_subscription(&sub).await?;
        tracing::info!(
            %user_id,
            %provider,
            channel_id = %sub.channel_id,
            expiration = %sub.expiration,
            "Watch started"
        );

        Ok(WatchInfo {
            subscription_id: sub.id,
            provider,
            channel_id: sub.channel_id,
            resource_id: sub.resource_id,
            history_id: sub.history_id,
            sync_token: sub.sync_token,
            expiration: sub.expiration,
        })
    }

    /// Stop the active channel, if any. Returns false when there was none.
    pub async fn stop_watch(&self, user_id: Uuid, provider: WatchProvider) -> SyncResult<bool> {
        let Some(sub) = self.store.get_active_subscription(user_id, provider).await? else {
            tracing::debug!(%user_id, %provider, "No active watch to stop");
            return Ok(false);
        };

        match self.authorized(user_id).await {
            Ok((_, token)) => {
                let stopped = match provider {
                    WatchProvider::Gmail => self.google.stop_gmail(&token).await,
                    WatchProvider::Calendar => {
                        self.google
                            .stop_channel(&token, &sub.channel_id, sub.resource_id.as_deref())
                            .await
                    }
                };
                if let Err(e) = stopped {
                    tracing::warn!(%user_id, %provider, "Could not stop watch with Google: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(%user_id, %provider, "Skipping provider stop: {}", e);
            }
        }

        self.store.deactivate_subscription(sub.id).await?;
        tracing::info!(%user_id, %provider, "Watch stopped");
        Ok(true)
    }

    pub async fn renew_watch(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> SyncResult<WatchInfo> {
        tracing::info!(%user_id, %provider, "Renewing watch");
        self.start_watch(user_id, provider).await
    }

    /// Active subscriptions expiring within `hours`
    pub async fn expiring_subscriptions(&self, hours: i64) -> SyncResult<Vec<PushSubscriptionNode>> {
        let before = Utc::now() + Duration::hours(hours);
        Ok(self.store.list_expiring_subscriptions(before).await?)
    }

    /// Watch state per provider, newest channel first
    pub async fn watch_status(&self, user_id: Uuid) -> SyncResult<WatchStatus> {
        let all = self.store.list_subscriptions(user_id).await?;
        let total_watches = all.len();
        let active_watches = all.iter().filter(|s| s.is_active).count();
        let (gmail, calendar): (Vec<_>, Vec<_>) = all
            .into_iter()
            .partition(|s| s.provider == WatchProvider::Gmail);

        let gmail = ProviderWatchStatus::from_history(gmail);
        let calendar = ProviderWatchStatus::from_history(calendar);
        let summary = WatchSummary {
            total_watches,
            active_watches,
            gmail_active: gmail.active,
            calendar_active: calendar.active,
        };
        Ok(WatchStatus {
            user_id,
            gmail,
            calendar,
            summary,
        })
    }

    /// Start both watches; each reports independently
    pub async fn setup_watches(&self, user_id: Uuid) -> WatchSetupReport {
        let (gmail, calendar) = tokio::join!(
            self.start_watch(user_id, WatchProvider::Gmail),
            self.start_watch(user_id, WatchProvider::Calendar),
        );
        if let Err(e) = &gmail {
            tracing::error!(%user_id, "Failed to set up Gmail watch: {}", e);
        }
        if let Err(e) = &calendar {
            tracing::error!(%user_id, "Failed to set up Calendar watch: {}", e);
        }
        WatchSetupReport {
            user_id,
            gmail: gmail.into(),
            calendar: calendar.into(),
        }
    }
}

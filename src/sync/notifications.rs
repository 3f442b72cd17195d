//! Processing of Google push notifications

use super::{SyncResult, SyncService, GOOGLE_PROVIDER};
use crate::neo4j::models::WatchProvider;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Headers of a Calendar channel notification
#[derive(Debug, Clone, Default)]
pub struct CalendarNotification {
    pub channel_id: String,
    pub resource_state: String,
    pub channel_token: Option<String>,
}

/// Pub/Sub push envelope
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubPush {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64 JSON payload
    #[serde(default)]
    pub data: String,
    #[serde(default, alias = "message_id")]
    pub message_id: Option<String>,
    #[serde(default, alias = "publish_time")]
    pub publish_time: Option<String>,
}

/// Decoded Gmail Pub/Sub payload
#[derive(Debug, Clone, PartialEq)]
pub struct GmailPushData {
    pub email_address: String,
    pub history_id: Option<String>,
}

impl PubSubPush {
    pub fn decode_gmail(&self) -> anyhow::Result<GmailPushData> {
        let bytes = STANDARD
            .decode(self.message.data.trim())
            .or_else(|_| URL_SAFE.decode(self.message.data.trim()))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;

        let email_address = value
            .get("emailAddress")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Pub/Sub payload missing emailAddress"))?
            .to_string();
        // Gmail sends historyId as a number; accept strings too
        let history_id = value.get("historyId").and_then(|v| match v {
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::String(s) => Some(s.clone()),
            _ => None,
        });

        Ok(GmailPushData {
            email_address,
            history_id,
        })
    }
}

/// What became of a notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Ignored { reason: String },
    Rejected { reason: String },
    Processed { user_id: Uuid, changes: usize },
}

impl NotificationOutcome {
    fn ignored(reason: &str) -> Self {
        NotificationOutcome::Ignored {
            reason: reason.to_string(),
        }
    }

    fn rejected(reason: &str) -> Self {
        NotificationOutcome::Rejected {
            reason: reason.to_string(),
        }
    }
}

impl SyncService {
    /// Check the `token` query parameter of a Pub/Sub push
    pub fn verify_pubsub_token(&self, token: Option<&str>) -> bool {
        match self.config.webhooks.pubsub_verification_token.as_deref() {
            None => true,
            Some(expected) => token == Some(expected),
        }
    }

    pub async fn process_calendar_notification(
        &self,
        notification: &CalendarNotification,
    ) -> SyncResult<NotificationOutcome> {
        if notification.resource_state == "sync" {
            tracing::debug!(channel_id = %notification.channel_id, "Calendar channel handshake");
            return Ok(NotificationOutcome::ignored("sync handshake"));
        }

        if let Some(secret) = self.config.webhooks.channel_secret.as_deref() {
            let valid = notification.channel_token.as_deref().is_some_and(|token| {
                super::watch::verify_channel_token(secret, &notification.channel_id, token)
            });
            if !valid {
                tracing::warn!(channel_id = %notification.channel_id, "Invalid calendar channel token");
                return Ok(NotificationOutcome::rejected("invalid channel token"));
            }
        }

        let Some(sub) = self
            .store
            .find_subscription_by_channel(&notification.channel_id)
            .await?
            .filter(|s| s.provider == WatchProvider::Calendar)
        else {
            tracing::warn!(channel_id = %notification.channel_id, "No active calendar subscription");
            return Ok(NotificationOutcome::ignored("unknown channel"));
        };

        let report = self.sync_calendar(sub.user_id).await?;
        self.store
            .record_notification(sub.id, None, report.next_sync_token.clone(), Utc::now())
            .await?;

        tracing::info!(
            user_id = %sub.user_id,
            changes = report.total_events,
            "Calendar notification processed"
        );
        Ok(NotificationOutcome::Processed {
            user_id: sub.user_id,
            changes: report.total_events,
        })
    }

    pub async fn process_gmail_notification(
        &self,
        push: &PubSubPush,
        channel_id: Option<&str>,
    ) -> SyncResult<NotificationOutcome> {
        let data = match push.decode_gmail() {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Undecodable Gmail push: {}", e);
                return Ok(NotificationOutcome::rejected("invalid payload"));
            }
        };

        let by_channel = match channel_id {
            Some(id) => self
                .store
                .find_subscription_by_channel(id)
                .await?
                .filter(|s| s.provider == WatchProvider::Gmail),
            None => None,
        };
        let sub = match by_channel {
            Some(sub) => Some(sub),
            None => match self
                .store
                .find_connection_by_email(GOOGLE_PROVIDER, &data.email_address)
                .await?
            {
                Some(conn) => {
                    self.store
                        .get_active_subscription(conn.user_id, WatchProvider::Gmail)
                        .await?
                }
                None => None,
            },
        };
        let Some(sub) = sub else {
            tracing::warn!(email = %data.email_address, "No active Gmail subscription");
            return Ok(NotificationOutcome::ignored("unknown mailbox"));
        };

        let (conn, token) = self.authorized(sub.user_id).await?;
        let (changes, latest) = match sub.history_id.as_deref() {
            Some(start) => match self.process_gmail_history(&conn, &token, start).await {
                Ok(report) => (report.changes(), report.latest_history_id),
                Err(e) => {
                    tracing::warn!(
                        user_id = %sub.user_id,
                        "History replay failed, falling back to incremental sync: {}",
                        e
                    );
                    let report = self.sync_gmail_incremental(sub.user_id).await?;
                    (report.total_emails, None)
                }
            },
            None => {
                let report = self.sync_gmail_incremental(sub.user_id).await?;
                (report.total_emails, None)
            }
        };

        let new_history_id = data.history_id.or(latest);
        self.store
            .record_notification(sub.id, new_history_id, None, Utc::now())
            .await?;

        tracing::info!(user_id = %sub.user_id, changes, "Gmail notification processed");
        Ok(NotificationOutcome::Processed {
            user_id: sub.user_id,
            changes,
        })
    }
}

//! Google push notification receivers
//!
//! Google retries anything that is not a 2xx, so every webhook acknowledges
//! with 200 and does the work in a spawned task. Rejected or malformed
//! notifications are logged and dropped.

use super::handlers::ApiState;
use crate::sync::notifications::{CalendarNotification, PubSubPush};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

pub const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";
pub const RESOURCE_STATE_HEADER: &str = "x-goog-resource-state";
pub const CHANNEL_TOKEN_HEADER: &str = "x-goog-channel-token";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

impl WebhookAck {
    fn queued(kind: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: format!("{} notification received and queued for processing", kind),
        })
    }

    fn dropped(message: &str) -> Json<Self> {
        Json(Self {
            success: false,
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PubSubQuery {
    pub token: Option<String>,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// POST /api/webhooks/calendar
pub async fn calendar_webhook(State(state): State<ApiState>, headers: HeaderMap) -> Json<WebhookAck> {
    let Some(channel_id) = header(&headers, CHANNEL_ID_HEADER) else {
        tracing::warn!("Calendar webhook without channel id");
        return WebhookAck::dropped("Missing channel id");
    };
    let notification = CalendarNotification {
        channel_id,
        resource_state: header(&headers, RESOURCE_STATE_HEADER).unwrap_or_default(),
        channel_token: header(&headers, CHANNEL_TOKEN_HEADER),
    };
    tracing::info!(
        channel_id = %notification.channel_id,
        state = %notification.resource_state,
        "Calendar webhook received"
    );

    let sync = state.sync.clone();
    tokio::spawn(async move {
        match sync.process_calendar_notification(&notification).await {
            Ok(outcome) => tracing::debug!(?outcome, "Calendar notification handled"),
            Err(e) => tracing::error!(
                channel_id = %notification.channel_id,
                "Calendar notification failed: {}",
                e
            ),
        }
    });

    WebhookAck::queued("Calendar")
}

/// POST /api/webhooks/gmail
pub async fn gmail_webhook(
    State(state): State<ApiState>,
    Query(query): Query<PubSubQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<WebhookAck> {
    if !state.sync.verify_pubsub_token(query.token.as_deref()) {
        tracing::warn!("Gmail webhook with invalid verification token");
        return WebhookAck::dropped("Invalid verification token");
    }

    let push: PubSubPush = match serde_json::from_slice(&body) {
        Ok(push) => push,
        Err(e) => {
            tracing::warn!("Could not parse Pub/Sub envelope: {}", e);
            return WebhookAck::dropped("Invalid Pub/Sub envelope");
        }
    };
    let channel_id = header(&headers, CHANNEL_ID_HEADER);
    tracing::info!(
        message_id = push.message.message_id.as_deref().unwrap_or("-"),
        "Gmail webhook received"
    );

    let sync = state.sync.clone();
    tokio::spawn(async move {
        match sync
            .process_gmail_notification(&push, channel_id.as_deref())
            .await
        {
            Ok(outcome) => tracing::debug!(?outcome, "Gmail notification handled"),
            Err(e) => tracing::error!("Gmail notification failed: {}", e),
        }
    });

    WebhookAck::queued("Gmail")
}

/// GET /api/webhooks/test
pub async fn webhook_test() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "message": "Webhook endpoint is accessible",
        "endpoints": {
            "gmail": "/api/webhooks/gmail",
            "calendar": "/api/webhooks/calendar"
        }
    }))
}

//! Wire types for the Google OAuth, Calendar and Gmail REST APIs

use serde::{Deserialize, Serialize};

// ============================================================================
// OAuth
// ============================================================================

/// Response of the token endpoint for `grant_type=refresh_token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenRefresh {
    pub access_token: String,
    pub expires_in: Option<i64>,
}

// ============================================================================
// Calendar
// ============================================================================

/// Query for `events.list` on the primary calendar
#[derive(Debug, Clone)]
pub struct EventListQuery {
    pub time_min: String,
    pub time_max: String,
    pub max_results: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventList {
    /// Kept as raw JSON so the full payload can be stored alongside the parsed fields
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
    pub next_sync_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    pub date_time: Option<String>,
    /// All-day events carry a bare `YYYY-MM-DD`
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoogleEvent {
    pub id: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
}

/// Body of `events.watch`
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Milliseconds since the epoch
    pub expiration: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: Option<String>,
    pub resource_id: Option<String>,
    /// Milliseconds since the epoch, as a string
    pub expiration: Option<String>,
}

// ============================================================================
// Gmail
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub data: Option<String>,
    #[serde(default)]
    pub size: i64,
    pub attachment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<MessageHeader>,
    #[serde(default)]
    pub body: MessageBody,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: String,
    /// Milliseconds since the epoch, as a string
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailWatchResponse {
    pub history_id: Option<String>,
    pub expiration: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryMessage {
    pub message: MessageRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: Option<String>,
    #[serde(default)]
    pub messages_added: Vec<HistoryMessage>,
    #[serde(default)]
    pub messages_deleted: Vec<HistoryMessage>,
    #[serde(default)]
    pub labels_added: Vec<HistoryMessage>,
    #[serde(default)]
    pub labels_removed: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryList {
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    pub history_id: Option<String>,
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_deserialization() {
        let json = r#"{
            "history": [
                {
                    "id": "101",
                    "messagesAdded": [{"message": {"id": "m1", "threadId": "t1", "labelIds": ["INBOX", "UNREAD"]}}],
                    "labelsRemoved": [{"message": {"id": "m0", "labelIds": ["INBOX"]}, "labelIds": ["UNREAD"]}]
                }
            ],
            "historyId": "105"
        }"#;
        let list: HistoryList = serde_json::from_str(json).unwrap();
        assert_eq!(list.history_id.as_deref(), Some("105"));
        let record = &list.history[0];
        assert_eq!(record.messages_added[0].message.label_ids.len(), 2);
        assert!(record.messages_deleted.is_empty());
        assert_eq!(record.labels_removed[0].message.id, "m0");
    }

    #[test]
    fn test_channel_request_serializes_type() {
        let req = ChannelRequest {
            id: "c1".into(),
            kind: "web_hook".into(),
            address: "https://example.com/hook".into(),
            token: None,
            expiration: 1,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["type"], "web_hook");
        assert!(json.get("token").is_none());
    }
}

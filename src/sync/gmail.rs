//! Gmail pull sync and history replay

use super::{SyncError, SyncResult, SyncService};
use crate::google::{GmailMessage, MessagePart};
use crate::neo4j::models::{AttachmentInfo, ConnectionNode, EmailNode};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Window of the first sync when no date is given
pub const DEFAULT_WINDOW_DAYS: i64 = 20;
pub const DEFAULT_MAX_RESULTS: u32 = 100;

const UNREAD_LABEL: &str = "UNREAD";
const INBOX_LABEL: &str = "INBOX";

/// Overlap with the previous run for incremental syncs
const INCREMENTAL_OVERLAP_HOURS: i64 = 1;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GmailSyncReport {
    pub new_emails: usize,
    pub updated_emails: usize,
    pub errors: usize,
    pub total_emails: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HistoryReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub latest_history_id: Option<String>,
}

impl HistoryReport {
    pub fn changes(&self) -> usize {
        self.added + self.updated + self.deleted
    }
}

impl SyncService {
    /// Fetch messages received since `since` (default: 20 days ago)
    pub async fn sync_gmail(
        &self,
        user_id: Uuid,
        max_results: u32,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<GmailSyncReport> {
        let (conn, token) = self.authorized(user_id).await?;

        let since = since.unwrap_or_else(|| Utc::now() - Duration::days(DEFAULT_WINDOW_DAYS));
        let query = format!("after:{}", since.format("%Y/%m/%d"));
        tracing::debug!(%user_id, %query, "Listing Gmail messages");

        let list = self
            .google
            .list_gmail_messages(&token, &query, max_results)
            .await?;

        let mut report = GmailSyncReport::default();
        for msg in &list.messages {
            match self.fetch_and_store(&conn, &token, &msg.id).await {
                Ok(true) => report.new_emails += 1,
                Ok(false) => report.updated_emails += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(%user_id, message_id = %msg.id, "Failed to sync message: {:#}", e);
                }
            }
        }
        report.total_emails = report.new_emails + report.updated_emails;

        self.store.mark_connection_synced(conn.id, Utc::now()).await?;
        tracing::info!(
            %user_id,
            new = report.new_emails,
            updated = report.updated_emails,
            errors = report.errors,
            "Gmail sync completed"
        );
        Ok(report)
    }

    /// Sync from an hour before the last run, or the default window
    pub async fn sync_gmail_incremental(&self, user_id: Uuid) -> SyncResult<GmailSyncReport> {
        let conn = self.connection(user_id).await?;
        let since = conn
            .last_synced
            .map(|at| at - Duration::hours(INCREMENTAL_OVERLAP_HOURS));
        self.sync_gmail(user_id, DEFAULT_MAX_RESULTS, since).await
    }

    /// Change labels on Gmail first, then mirror the returned label set locally
    pub async fn modify_email_labels(
        &self,
        user_id: Uuid,
        external_id: &str,
        add: &[&str],
        remove: &[&str],
    ) -> SyncResult<EmailNode> {
        if self.store.get_email(user_id, external_id).await?.is_none() {
            return Err(SyncError::NotFound("Email".to_string()));
        }
        let (_, token) = self.authorized(user_id).await?;

        let updated = self
            .google
            .modify_gmail_message(&token, external_id, add, remove)
            .await?;
        self.store
            .update_email_labels(user_id, external_id, updated.label_ids)
            .await?;
        tracing::info!(%user_id, message_id = %external_id, ?add, ?remove, "Email labels updated");

        self.store
            .get_email(user_id, external_id)
            .await?
            .ok_or_else(|| SyncError::NotFound("Email".to_string()))
    }

    pub async fn mark_email_read(
        &self,
        user_id: Uuid,
        external_id: &str,
        read: bool,
    ) -> SyncResult<EmailNode> {
        if read {
            self.modify_email_labels(user_id, external_id, &[], &[UNREAD_LABEL])
                .await
        } else {
            self.modify_email_labels(user_id, external_id, &[UNREAD_LABEL], &[])
                .await
        }
    }

    /// Archiving removes the message from the inbox
    pub async fn archive_email(&self, user_id: Uuid, external_id: &str) -> SyncResult<EmailNode> {
        self.modify_email_labels(user_id, external_id, &[], &[INBOX_LABEL])
            .await
    }

    /// Replay mailbox changes since `start_history_id`
    pub(crate) async fn process_gmail_history(
        &self,
        conn: &ConnectionNode,
        token: &str,
        start_history_id: &str,
    ) -> SyncResult<HistoryReport> {
        let mut report = HistoryReport::default();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .google
                .list_gmail_history(token, start_history_id, page_token.as_deref())
                .await?;

            for record in &page.history {
                for added in &record.messages_added {
                    match self.fetch_and_store(conn, token, &added.message.id).await {
                        Ok(true) => report.added += 1,
                        Ok(false) => report.updated += 1,
                        Err(e) => tracing::warn!(
                            message_id = %added.message.id,
                            "Failed to fetch added message: {:#}",
                            e
                        ),
                    }
                }
                for deleted in &record.messages_deleted {
                    if self
                        .store
                        .delete_email(conn.user_id, &deleted.message.id)
                        .await?
                    {
                        report.deleted += 1;
                    }
                }
                for changed in record.labels_added.iter().chain(&record.labels_removed) {
                    if self
                        .store
                        .update_email_labels(
                            conn.user_id,
                            &changed.message.id,
                            changed.message.label_ids.clone(),
                        )
                        .await?
                    {
                        report.updated += 1;
                    }
                }
            }

            if page.history_id.is_some() {
                report.latest_history_id = page.history_id;
            }
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        self.store
            .mark_connection_synced(conn.id, Utc::now())
            .await?;
        Ok(report)
    }

    /// Fetch one message in full and upsert it. Returns true when new.
    async fn fetch_and_store(
        &self,
        conn: &ConnectionNode,
        token: &str,
        message_id: &str,
    ) -> anyhow::Result<bool> {
        let message = self.google.get_gmail_message(token, message_id).await?;
        let email = email_from_message(conn.user_id, conn.id, message, Utc::now());
        self.store.upsert_email(&email).await
    }
}

/// Map a full Gmail message onto a stored row
pub(crate) fn email_from_message(
    user_id: Uuid,
    connection_id: Uuid,
    message: GmailMessage,
    synced_at: DateTime<Utc>,
) -> EmailNode {
    let headers = parse_headers(&message.payload);
    let (plain, html) = decode_body(&message.payload);
    let mut attachments = Vec::new();
    collect_attachments(&message.payload, &mut attachments);

    let received_at = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis);

    let mut email = EmailNode {
        id: Uuid::new_v4(),
        user_id,
        connection_id,
        external_id: message.id,
        thread_id: message.thread_id,
        subject: headers
            .get("subject")
            .cloned()
            .unwrap_or_else(|| "(No Subject)".to_string()),
        from: headers.get("from").cloned().unwrap_or_default(),
        to: split_addresses(headers.get("to")),
        cc: split_addresses(headers.get("cc")),
        body: if plain.is_empty() { html } else { plain },
        snippet: message.snippet,
        labels: Vec::new(),
        is_read: true,
        is_starred: false,
        is_important: false,
        is_draft: false,
        received_at,
        attachments,
        synced_at,
    };
    email.apply_labels(message.label_ids);
    email
}

/// Lower-cased header map of the top-level part
fn parse_headers(payload: &MessagePart) -> HashMap<String, String> {
    payload
        .headers
        .iter()
        .map(|h| (h.name.to_ascii_lowercase(), h.value.clone()))
        .collect()
}

fn split_addresses(value: Option<&String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Decode Gmail's base64url body data, padded or not
fn decode_data(data: &str) -> Option<String> {
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Plain and HTML bodies, searching multipart trees
fn decode_body(payload: &MessagePart) -> (String, String) {
    fn walk(part: &MessagePart, plain: &mut String, html: &mut String) {
        match part.mime_type.as_str() {
            "text/plain" => {
                if let Some(text) = part.body.data.as_deref().and_then(decode_data) {
                    *plain = text;
                }
            }
            "text/html" => {
                if let Some(text) = part.body.data.as_deref().and_then(decode_data) {
                    *html = text;
                }
            }
            mime if mime.starts_with("multipart/") => {
                for sub in &part.parts {
                    walk(sub, plain, html);
                }
            }
            _ => {}
        }
    }

    let mut plain = String::new();
    let mut html = String::new();
    if payload.parts.is_empty() {
        walk(payload, &mut plain, &mut html);
    } else {
        for part in &payload.parts {
            walk(part, &mut plain, &mut html);
        }
    }
    (plain, html)
}

fn collect_attachments(part: &MessagePart, out: &mut Vec<AttachmentInfo>) {
    if !part.filename.is_empty() {
        if let Some(attachment_id) = &part.body.attachment_id {
            out.push(AttachmentInfo {
                filename: part.filename.clone(),
                mime_type: part.mime_type.clone(),
                size: part.body.size,
                attachment_id: Some(attachment_id.clone()),
            });
        }
    }
    for sub in &part.parts {
        collect_attachments(sub, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::traits::RecordStore;
    use crate::test_helpers::{gmail_message, sync_fixture};
    use base64::engine::general_purpose::URL_SAFE;
    use serde_json::json;

    fn multipart_message() -> GmailMessage {
        serde_json::from_value(json!({
            "id": "m-1",
            "threadId": "t-1",
            "labelIds": ["INBOX", "UNREAD", "STARRED"],
            "snippet": "Hello there",
            "internalDate": "1700000000000",
            "payload": {
                "mimeType": "multipart/mixed",
                "headers": [
                    {"name": "Subject", "value": "Quarterly report"},
                    {"name": "FROM", "value": "Bob <bob@example.com>"},
                    {"name": "to", "value": "alice@example.com, carol@example.com"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/alternative",
                        "parts": [
                            {"mimeType": "text/html", "body": {"data": URL_SAFE.encode("<p>Hi</p>")}},
                            {"mimeType": "text/plain", "body": {"data": URL_SAFE_NO_PAD.encode("Hi?")}}
                        ]
                    },
                    {
                        "mimeType": "application/pdf",
                        "filename": "report.pdf",
                        "body": {"size": 2048, "attachmentId": "att-1"}
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_email_mapping() {
        let email = email_from_message(Uuid::nil(), Uuid::nil(), multipart_message(), Utc::now());
        assert_eq!(email.subject, "Quarterly report");
        assert_eq!(email.from, "Bob <bob@example.com>");
        assert_eq!(email.to, vec!["alice@example.com", "carol@example.com"]);
        assert!(email.cc.is_empty());
        assert_eq!(email.body, "Hi?");
        assert!(!email.is_read);
        assert!(email.is_starred);
        assert!(!email.is_draft);
        assert_eq!(email.received_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].filename, "report.pdf");
        assert_eq!(email.attachments[0].size, 2048);
    }

    #[test]
    fn test_html_fallback_and_missing_subject() {
        let message: GmailMessage = serde_json::from_value(json!({
            "id": "m-2",
            "payload": {
                "mimeType": "text/html",
                "body": {"data": URL_SAFE.encode("<b>only html</b>")}
            }
        }))
        .unwrap();
        let email = email_from_message(Uuid::nil(), Uuid::nil(), message, Utc::now());
        assert_eq!(email.subject, "(No Subject)");
        assert_eq!(email.body, "<b>only html</b>");
        assert!(email.is_read);
        assert!(email.received_at.is_none());
    }

    #[tokio::test]
    async fn test_sync_counts_and_skips_failures() {
        let fx = sync_fixture().await;
        fx.google.add_message(gmail_message("m-1", &["INBOX"]));
        fx.google.add_message(gmail_message("m-2", &["INBOX", "UNREAD"]));
        fx.google.add_missing_message("m-broken");

        let report = fx.sync.sync_gmail(fx.user_id, 100, None).await.unwrap();
        assert_eq!(report.new_emails, 2);
        assert_eq!(report.errors, 1);

        let again = fx.sync.sync_gmail(fx.user_id, 100, None).await.unwrap();
        assert_eq!(again.new_emails, 0);
        assert_eq!(again.updated_emails, 2);

        let (unread, total) = fx.store.list_emails(fx.user_id, true, 10, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(unread[0].external_id, "m-2");
    }

    #[tokio::test]
    async fn test_mark_read_and_archive_follow_gmail_labels() {
        let fx = sync_fixture().await;
        fx.google.add_message(gmail_message("m-1", &["INBOX", "UNREAD"]));
        fx.sync.sync_gmail(fx.user_id, 10, None).await.unwrap();

        let read = fx.sync.mark_email_read(fx.user_id, "m-1", true).await.unwrap();
        assert!(read.is_read);
        assert_eq!(read.labels, vec!["INBOX"]);

        let unread = fx.sync.mark_email_read(fx.user_id, "m-1", false).await.unwrap();
        assert!(!unread.is_read);

        let archived = fx.sync.archive_email(fx.user_id, "m-1").await.unwrap();
        assert!(!archived.labels.iter().any(|l| l == "INBOX"));
        assert!(!archived.is_read);

        let (stored, _) = fx.store.list_emails(fx.user_id, true, 10, 0).await.unwrap();
        assert_eq!(stored[0].labels, vec!["UNREAD"]);
    }

    #[tokio::test]
    async fn test_modify_unknown_email_is_not_found() {
        let fx = sync_fixture().await;
        let err = fx
            .sync
            .mark_email_read(fx.user_id, "missing", true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_incremental_query_uses_last_sync() {
        let fx = sync_fixture().await;
        let last = Utc::now() - Duration::days(2);
        fx.store
            .mark_connection_synced(fx.connection_id, last)
            .await
            .unwrap();

        fx.sync.sync_gmail_incremental(fx.user_id).await.unwrap();
        let expected = format!(
            "after:{}",
            (last - Duration::hours(1)).format("%Y/%m/%d")
        );
        assert_eq!(fx.google.last_gmail_query().as_deref(), Some(expected.as_str()));
    }
}

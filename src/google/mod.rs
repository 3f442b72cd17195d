//! Google API access
//!
//! [`GoogleApi`] is the seam between the sync layer and Google's REST
//! endpoints. [`GoogleClient`] talks HTTP; tests script their own implementation.

pub mod client;
pub mod models;

pub use client::GoogleClient;
pub use models::*;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait GoogleApi: Send + Sync {
    /// Exchange a refresh token for a new access token
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenRefresh>;

    /// List expanded single events on the primary calendar, ordered by start time
    async fn list_calendar_events(
        &self,
        access_token: &str,
        query: &EventListQuery,
    ) -> Result<EventList>;

    /// Fetch the current `nextSyncToken` of the primary calendar
    async fn calendar_sync_token(&self, access_token: &str) -> Result<Option<String>>;

    async fn watch_calendar(
        &self,
        access_token: &str,
        channel: &ChannelRequest,
    ) -> Result<ChannelResponse>;

    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: Option<&str>,
    ) -> Result<()>;

    async fn list_gmail_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<MessageList>;

    async fn get_gmail_message(&self, access_token: &str, id: &str) -> Result<GmailMessage>;

    /// Add and remove labels on a message; the response carries the new label set
    async fn modify_gmail_message(
        &self,
        access_token: &str,
        id: &str,
        add_label_ids: &[&str],
        remove_label_ids: &[&str],
    ) -> Result<GmailMessage>;

    async fn watch_gmail(
        &self,
        access_token: &str,
        topic_name: &str,
        label_ids: &[&str],
    ) -> Result<GmailWatchResponse>;

    async fn stop_gmail(&self, access_token: &str) -> Result<()>;

    async fn list_gmail_history(
        &self,
        access_token: &str,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryList>;
}

//! reqwest-backed Google API client

use super::models::*;
use super::GoogleApi;
use crate::GoogleConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub struct GoogleClient {
    http: reqwest::Client,
    token_url: String,
    calendar_base_url: String,
    gmail_base_url: String,
}

impl GoogleClient {
    pub fn new(config: &GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: config.token_url.clone(),
            calendar_base_url: config.calendar_base_url.trim_end_matches('/').to_string(),
            gmail_base_url: config.gmail_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fail with the status and body on a non-2xx response
    async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_else(|_| "no body".to_string());
        bail!("Google {} failed ({}): {}", what, status, body);
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
        Self::ensure_success(resp, what)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse Google {} response", what))
    }
}

#[async_trait]
impl GoogleApi for GoogleClient {
    async fn refresh_access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenRefresh> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to request Google token refresh")?;

        Self::parse(resp, "token refresh").await
    }

    async fn list_calendar_events(
        &self,
        access_token: &str,
        query: &EventListQuery,
    ) -> Result<EventList> {
        let max_results = query.max_results.to_string();
        let resp = self
            .http
            .get(format!("{}/calendars/primary/events", self.calendar_base_url))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", query.time_min.as_str()),
                ("timeMax", query.time_max.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .context("Failed to request calendar events")?;

        Self::parse(resp, "calendar events list").await
    }

    async fn calendar_sync_token(&self, access_token: &str) -> Result<Option<String>> {
        let resp = self
            .http
            .get(format!("{}/calendars/primary/events", self.calendar_base_url))
            .bearer_auth(access_token)
            .query(&[("maxResults", "1")])
            .send()
            .await
            .context("Failed to request calendar sync token")?;

        let list: EventList = Self::parse(resp, "calendar sync token").await?;
        Ok(list.next_sync_token)
    }

    async fn watch_calendar(
        &self,
        access_token: &str,
        channel: &ChannelRequest,
    ) -> Result<ChannelResponse> {
        let resp = self
            .http
            .post(format!(
                "{}/calendars/primary/events/watch",
                self.calendar_base_url
            ))
            .bearer_auth(access_token)
            .json(channel)
            .send()
            .await
            .context("Failed to request calendar watch")?;

        Self::parse(resp, "calendar watch").await
    }

    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: Option<&str>,
    ) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/channels/stop", self.calendar_base_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "id": channel_id,
                "resourceId": resource_id,
            }))
            .send()
            .await
            .context("Failed to request channel stop")?;

        Self::ensure_success(resp, "channel stop").await?;
        Ok(())
    }

    async fn list_gmail_messages(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<MessageList> {
        let max_results = max_results.to_string();
        let resp = self
            .http
            .get(format!("{}/users/me/messages", self.gmail_base_url))
            .bearer_auth(access_token)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await
            .context("Failed to request Gmail messages")?;

        Self::parse(resp, "Gmail messages list").await
    }

    async fn get_gmail_message(&self, access_token: &str, id: &str) -> Result<GmailMessage> {
        let resp = self
            .http
            .get(format!(
                "{}/users/me/messages/{}",
                self.gmail_base_url,
                urlencoding::encode(id)
            ))
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .context("Failed to request Gmail message")?;

        Self::parse(resp, "Gmail message get").await
    }

    async fn modify_gmail_message(
        &self,
        access_token: &str,
        id: &str,
        add_label_ids: &[&str],
        remove_label_ids: &[&str],
    ) -> Result<GmailMessage> {
        let resp = self
            .http
            .post(format!(
                "{}/users/me/messages/{}/modify",
                self.gmail_base_url,
                urlencoding::encode(id)
            ))
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "addLabelIds": add_label_ids,
                "removeLabelIds": remove_label_ids,
            }))
            .send()
            .await
            .context("Failed to request Gmail message modify")?;

        Self::parse(resp, "Gmail message modify").await
    }

    async fn watch_gmail(
        &self,
        access_token: &str,
        topic_name: &str,
        label_ids: &[&str],
    ) -> Result<GmailWatchResponse> {
        let resp = self
            .http
            .post(format!("{}/users/me/watch", self.gmail_base_url))
            .bearer_auth(access_token)
            .json(&serde_json::json!({
                "labelIds": label_ids,
                "topicName": topic_name,
            }))
            .send()
            .await
            .context("Failed to request Gmail watch")?;

        Self::parse(resp, "Gmail watch").await
    }

    async fn stop_gmail(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/users/me/stop", self.gmail_base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to request Gmail stop")?;

        Self::ensure_success(resp, "Gmail stop").await?;
        Ok(())
    }

    async fn list_gmail_history(
        &self,
        access_token: &str,
        start_history_id: &str,
        page_token: Option<&str>,
    ) -> Result<HistoryList> {
        let mut params = vec![("startHistoryId", start_history_id)];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        let resp = self
            .http
            .get(format!("{}/users/me/history", self.gmail_base_url))
            .bearer_auth(access_token)
            .query(&params)
            .send()
            .await
            .context("Failed to request Gmail history")?;

        Self::parse(resp, "Gmail history list").await
    }
}

//! `RecordStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::client::Neo4jClient;
use super::models::*;
use super::traits::{RecordStore, TaskWrite};
use crate::tasks::models::UpdateTaskRequest;

#[async_trait]
impl RecordStore for Neo4jClient {
    // ========================================================================
    // Task operations
    // ========================================================================

    async fn create_task(&self, task: &TaskNode) -> anyhow::Result<Option<TaskNode>> {
        self.create_task(task).await
    }

    async fn get_task(&self, owner_id: Uuid, task_id: Uuid) -> anyhow::Result<Option<TaskNode>> {
        self.get_task(owner_id, task_id).await
    }

    async fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        updates: &UpdateTaskRequest,
    ) -> anyhow::Result<TaskWrite> {
        self.update_task(owner_id, task_id, updates).await
    }

    async fn delete_task_tree(&self, owner_id: Uuid, task_id: Uuid) -> anyhow::Result<u64> {
        self.delete_task_tree(owner_id, task_id).await
    }

    async fn list_tasks(
        &self,
        owner_id: Uuid,
        filters: &TaskFilters,
    ) -> anyhow::Result<Vec<TaskNode>> {
        self.list_tasks(owner_id, filters).await
    }

    async fn set_task_positions(
        &self,
        owner_id: Uuid,
        positions: &[(Uuid, i64)],
    ) -> anyhow::Result<Vec<TaskNode>> {
        self.set_task_positions(owner_id, positions).await
    }

    // ========================================================================
    // User operations
    // ========================================================================

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<UserNode>> {
        self.get_user(id).await
    }

    async fn create_user(&self, user: &UserNode) -> anyhow::Result<bool> {
        self.create_user(user).await
    }

    async fn update_user_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> anyhow::Result<()> {
        self.update_user_profile(id, name, avatar_url).await
    }

    // ========================================================================
    // OAuth connection operations
    // ========================================================================

    async fn upsert_connection(&self, conn: &ConnectionNode) -> anyhow::Result<ConnectionNode> {
        self.upsert_connection(conn).await
    }

    async fn get_connection(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> anyhow::Result<Option<ConnectionNode>> {
        self.get_connection(user_id, id).await
    }

    async fn list_connections(&self, user_id: Uuid) -> anyhow::Result<Vec<ConnectionNode>> {
        self.list_connections(user_id).await
    }

    async fn deactivate_connection(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<bool> {
        self.deactivate_connection(user_id, id).await
    }

    async fn get_active_connection(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> anyhow::Result<Option<ConnectionNode>> {
        self.get_active_connection(user_id, provider).await
    }

    async fn list_active_connections(
        &self,
        provider: &str,
    ) -> anyhow::Result<Vec<ConnectionNode>> {
        self.list_active_connections(provider).await
    }

    async fn find_connection_by_email(
        &self,
        provider: &str,
        email: &str,
    ) -> anyhow::Result<Option<ConnectionNode>> {
        self.find_connection_by_email(provider, email).await
    }

    async fn update_connection_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.update_connection_tokens(id, access_token, expires_at)
            .await
    }

    async fn mark_connection_synced(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.mark_connection_synced(id, at).await
    }

    // ========================================================================
    // Push subscription operations
    // ========================================================================

    async fn create_subscription(&self, sub: &PushSubscriptionNode) -> anyhow::Result<()> {
        self.create_subscription(sub).await
    }

    async fn get_active_subscription(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> anyhow::Result<Option<PushSubscriptionNode>> {
        self.get_active_subscription(user_id, provider).await
    }

    async fn find_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> anyhow::Result<Option<PushSubscriptionNode>> {
        self.find_subscription_by_channel(channel_id).await
    }

    async fn deactivate_subscription(&self, id: Uuid) -> anyhow::Result<()> {
        self.deactivate_subscription(id).await
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> anyhow::Result<Vec<PushSubscriptionNode>> {
        self.list_subscriptions(user_id).await
    }

    async fn list_expiring_subscriptions(
        &self,
        before: DateTime<Utc>,
    ) -> anyhow::Result<Vec<PushSubscriptionNode>> {
        self.list_expiring_subscriptions(before).await
    }

    async fn record_notification(
        &self,
        id: Uuid,
        history_id: Option<String>,
        sync_token: Option<String>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.record_notification(id, history_id, sync_token, at)
            .await
    }

    // ========================================================================
    // Calendar event operations
    // ========================================================================

    async fn upsert_calendar_event(&self, event: &CalendarEventNode) -> anyhow::Result<bool> {
        self.upsert_calendar_event(event).await
    }

    async fn delete_calendar_event(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> anyhow::Result<bool> {
        self.delete_calendar_event(user_id, external_id).await
    }

    async fn list_calendar_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEventNode>> {
        self.list_calendar_events(user_id, from, to).await
    }

    // ========================================================================
    // Email operations
    // ========================================================================

    async fn upsert_email(&self, email: &EmailNode) -> anyhow::Result<bool> {
        self.upsert_email(email).await
    }

    async fn delete_email(&self, user_id: Uuid, external_id: &str) -> anyhow::Result<bool> {
        self.delete_email(user_id, external_id).await
    }

    async fn get_email(
        &self,
        user_id: Uuid,
        external_id: &str,
    ) -> anyhow::Result<Option<EmailNode>> {
        self.get_email(user_id, external_id).await
    }

    async fn update_email_labels(
        &self,
        user_id: Uuid,
        external_id: &str,
        labels: Vec<String>,
    ) -> anyhow::Result<bool> {
        self.update_email_labels(user_id, external_id, labels).await
    }

    async fn list_emails(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<(Vec<EmailNode>, usize)> {
        self.list_emails(user_id, unread_only, limit, offset).await
    }

    async fn health_check(&self) -> anyhow::Result<bool> {
        self.health_check().await
    }
}

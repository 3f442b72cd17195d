//! RecordStore trait definition
//!
//! The abstract interface every persistence backend implements. Each method
//! is a single atomic unit against the backing store, and every owner-scoped
//! method takes the owner id explicitly.

use crate::neo4j::models::*;
use crate::tasks::models::UpdateTaskRequest;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of a task write that validates the parent inside the write itself
#[derive(Debug, Clone, PartialEq)]
pub enum TaskWrite {
    Written(TaskNode),
    NotFound,
    /// Parent missing, owned by someone else, or inside the moved subtree
    InvalidParent,
    /// The task (or its subtree) would sit below the deepest level
    DepthExceeded,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // Task operations
    // ========================================================================

    /// Insert a task. The level is derived from the parent inside the write;
    /// `None` means the parent was missing, foreign, or already at the deepest level.
    async fn create_task(&self, task: &TaskNode) -> Result<Option<TaskNode>>;

    /// Get a task owned by `owner_id`
    async fn get_task(&self, owner_id: Uuid, task_id: Uuid) -> Result<Option<TaskNode>>;

    /// Apply field changes; a `parent_id` change re-levels the whole subtree
    async fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        updates: &UpdateTaskRequest,
    ) -> Result<TaskWrite>;

    /// Delete a task and all its descendants, returning how many were removed
    async fn delete_task_tree(&self, owner_id: Uuid, task_id: Uuid) -> Result<u64>;

    /// List an owner's tasks ordered by (parent_id, position, created_at)
    async fn list_tasks(&self, owner_id: Uuid, filters: &TaskFilters) -> Result<Vec<TaskNode>>;

    /// Bulk-set positions. Ids not owned by `owner_id` are skipped.
    async fn set_task_positions(
        &self,
        owner_id: Uuid,
        positions: &[(Uuid, i64)],
    ) -> Result<Vec<TaskNode>>;

    // ========================================================================
    // User operations
    // ========================================================================

    async fn get_user(&self, id: Uuid) -> Result<Option<UserNode>>;

    /// Insert a user unless the id exists. Returns true when created.
    async fn create_user(&self, user: &UserNode) -> Result<bool>;

    async fn update_user_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<()>;

    // ========================================================================
    // OAuth connection operations
    // ========================================================================

    /// Insert or update keyed by (user_id, provider, provider_user_id).
    /// Always re-activates; returns the stored row.
    async fn upsert_connection(&self, conn: &ConnectionNode) -> Result<ConnectionNode>;

    async fn get_connection(&self, user_id: Uuid, id: Uuid) -> Result<Option<ConnectionNode>>;

    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<ConnectionNode>>;

    /// Mark a connection inactive. Returns false if the user has no such connection.
    async fn deactivate_connection(&self, user_id: Uuid, id: Uuid) -> Result<bool>;

    /// Most recently updated active connection for a provider
    async fn get_active_connection(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<ConnectionNode>>;

    async fn list_active_connections(&self, provider: &str) -> Result<Vec<ConnectionNode>>;

    async fn find_connection_by_email(
        &self,
        provider: &str,
        email: &str,
    ) -> Result<Option<ConnectionNode>>;

    async fn update_connection_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_connection_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()>;

    // ========================================================================
    // Push subscription operations
    // ========================================================================

    async fn create_subscription(&self, sub: &PushSubscriptionNode) -> Result<()>;

    async fn get_active_subscription(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> Result<Option<PushSubscriptionNode>>;

    /// Active subscription registered under a channel id
    async fn find_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<PushSubscriptionNode>>;

    /// Every subscription a user ever had, newest first
    async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<PushSubscriptionNode>>;

    async fn deactivate_subscription(&self, id: Uuid) -> Result<()>;

    /// Active subscriptions expiring before `before`
    async fn list_expiring_subscriptions(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PushSubscriptionNode>>;

    /// Bump the notification counter and refresh cursors that were supplied
    async fn record_notification(
        &self,
        id: Uuid,
        history_id: Option<String>,
        sync_token: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    // ========================================================================
    // Calendar event operations
    // ========================================================================

    /// Upsert by (user_id, external_id). Returns true when a new row was inserted.
    async fn upsert_calendar_event(&self, event: &CalendarEventNode) -> Result<bool>;

    async fn delete_calendar_event(&self, user_id: Uuid, external_id: &str) -> Result<bool>;

    /// Events starting within [from, to], ordered by start time
    async fn list_calendar_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventNode>>;

    // ========================================================================
    // Email operations
    // ========================================================================

    /// Upsert by (user_id, external_id). Returns true when a new row was inserted.
    async fn upsert_email(&self, email: &EmailNode) -> Result<bool>;

    async fn get_email(&self, user_id: Uuid, external_id: &str) -> Result<Option<EmailNode>>;

    async fn delete_email(&self, user_id: Uuid, external_id: &str) -> Result<bool>;

    async fn update_email_labels(
        &self,
        user_id: Uuid,
        external_id: &str,
        labels: Vec<String>,
    ) -> Result<bool>;

    /// Newest first, with the total count before pagination
    async fn list_emails(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmailNode>, usize)>;

    // ========================================================================
    // Health
    // ========================================================================

    async fn health_check(&self) -> Result<bool>;
}

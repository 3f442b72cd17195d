//! In-memory implementation of RecordStore.
//!
//! Backs `store.backend: memory` for local development and the test suites.
//! Each collection sits behind its own `tokio::sync::RwLock`, and every
//! operation holds the relevant write lock for its whole duration.

use crate::neo4j::models::*;
use crate::neo4j::traits::{RecordStore, TaskWrite};
use crate::tasks::models::UpdateTaskRequest;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    pub tasks: RwLock<HashMap<Uuid, TaskNode>>,
    pub users: RwLock<HashMap<Uuid, UserNode>>,
    pub connections: RwLock<HashMap<Uuid, ConnectionNode>>,
    pub subscriptions: RwLock<HashMap<Uuid, PushSubscriptionNode>>,
    pub calendar_events: RwLock<HashMap<Uuid, CalendarEventNode>>,
    pub emails: RwLock<HashMap<Uuid, EmailNode>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Every transitive descendant of `root` paired with its distance from it
fn descendants_of(tasks: &HashMap<Uuid, TaskNode>, root: Uuid) -> Vec<(Uuid, u32)> {
    let mut children: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for task in tasks.values() {
        if let Some(parent) = task.parent_id {
            children.entry(parent).or_default().push(task.id);
        }
    }

    let mut found = Vec::new();
    let mut queue = VecDeque::from([(root, 0u32)]);
    while let Some((id, depth)) = queue.pop_front() {
        if let Some(kids) = children.get(&id) {
            for kid in kids {
                found.push((*kid, depth + 1));
                queue.push_back((*kid, depth + 1));
            }
        }
    }
    found
}

#[async_trait]
impl RecordStore for MemoryStore {
    // ========================================================================
    // Task operations
    // ========================================================================

    async fn create_task(&self, task: &TaskNode) -> Result<Option<TaskNode>> {
        let mut tasks = self.tasks.write().await;
        let level = match task.parent_id {
            None => 0,
            Some(parent_id) => match tasks.get(&parent_id) {
                Some(p) if p.owner_id == task.owner_id && p.level < MAX_TASK_LEVEL => p.level + 1,
                _ => return Ok(None),
            },
        };
        let mut stored = task.clone();
        stored.level = level;
        tasks.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn get_task(&self, owner_id: Uuid, task_id: Uuid) -> Result<Option<TaskNode>> {
        Ok(self
            .tasks
            .read()
            .await
            .get(&task_id)
            .filter(|t| t.owner_id == owner_id)
            .cloned())
    }

    async fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        updates: &UpdateTaskRequest,
    ) -> Result<TaskWrite> {
        let mut tasks = self.tasks.write().await;
        let Some(current) = tasks.get(&task_id).filter(|t| t.owner_id == owner_id) else {
            return Ok(TaskWrite::NotFound);
        };
        let mut updated = current.clone();

        let mut relevel = Vec::new();
        if let Some(new_parent) = updates.parent_id {
            let subtree = descendants_of(&tasks, task_id);
            let new_level = match new_parent {
                None => 0,
                Some(pid) => {
                    if pid == task_id || subtree.iter().any(|(id, _)| *id == pid) {
                        return Ok(TaskWrite::InvalidParent);
                    }
                    match tasks.get(&pid).filter(|p| p.owner_id == owner_id) {
                        Some(parent) => parent.level + 1,
                        None => return Ok(TaskWrite::InvalidParent),
                    }
                }
            };
            let height = subtree.iter().map(|(_, d)| *d).max().unwrap_or(0);
            if new_level + height > MAX_TASK_LEVEL {
                return Ok(TaskWrite::DepthExceeded);
            }
            updated.parent_id = new_parent;
            updated.level = new_level;
            relevel = subtree
                .into_iter()
                .map(|(id, depth)| (id, new_level + depth))
                .collect();
        }

        updates.apply_fields(&mut updated);
        updated.updated_at = Utc::now();

        for (id, level) in relevel {
            if let Some(t) = tasks.get_mut(&id) {
                t.level = level;
            }
        }
        tasks.insert(task_id, updated.clone());
        Ok(TaskWrite::Written(updated))
    }

    async fn delete_task_tree(&self, owner_id: Uuid, task_id: Uuid) -> Result<u64> {
        let mut tasks = self.tasks.write().await;
        if !tasks.get(&task_id).is_some_and(|t| t.owner_id == owner_id) {
            return Ok(0);
        }
        let doomed = descendants_of(&tasks, task_id);
        tasks.remove(&task_id);
        for (id, _) in &doomed {
            tasks.remove(id);
        }
        Ok(doomed.len() as u64 + 1)
    }

    async fn list_tasks(&self, owner_id: Uuid, filters: &TaskFilters) -> Result<Vec<TaskNode>> {
        let mut tasks: Vec<TaskNode> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.owner_id == owner_id && filters.matches(t))
            .cloned()
            .collect();
        sort_tasks(&mut tasks);
        Ok(tasks)
    }

    async fn set_task_positions(
        &self,
        owner_id: Uuid,
        positions: &[(Uuid, i64)],
    ) -> Result<Vec<TaskNode>> {
        let mut tasks = self.tasks.write().await;
        let now = Utc::now();
        let mut updated = Vec::new();
        for (id, position) in positions {
            if let Some(task) = tasks.get_mut(id).filter(|t| t.owner_id == owner_id) {
                task.position = *position;
                task.updated_at = now;
                updated.push(task.clone());
            }
        }
        Ok(updated)
    }

    // ========================================================================
    // User operations
    // ========================================================================

    async fn get_user(&self, id: Uuid) -> Result<Option<UserNode>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn create_user(&self, user: &UserNode) -> Result<bool> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.id) {
            return Ok(false);
        }
        users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn update_user_profile(
        &self,
        id: Uuid,
        name: Option<String>,
        avatar_url: Option<String>,
    ) -> Result<()> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            if name.is_some() {
                user.name = name;
            }
            if avatar_url.is_some() {
                user.avatar_url = avatar_url;
            }
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    // ========================================================================
    // OAuth connection operations
    // ========================================================================

    async fn upsert_connection(&self, conn: &ConnectionNode) -> Result<ConnectionNode> {
        let mut connections = self.connections.write().await;
        let existing = connections.values_mut().find(|c| {
            c.user_id == conn.user_id
                && c.provider == conn.provider
                && c.provider_user_id == conn.provider_user_id
        });
        match existing {
            Some(c) => {
                c.provider_email = conn.provider_email.clone();
                c.access_token = conn.access_token.clone();
                c.refresh_token = conn.refresh_token.clone();
                c.token_expires_at = conn.token_expires_at;
                c.scopes = conn.scopes.clone();
                c.metadata = conn.metadata.clone();
                c.is_active = true;
                c.updated_at = Utc::now();
                Ok(c.clone())
            }
            None => {
                let mut stored = conn.clone();
                stored.is_active = true;
                connections.insert(stored.id, stored.clone());
                Ok(stored)
            }
        }
    }

    async fn get_connection(&self, user_id: Uuid, id: Uuid) -> Result<Option<ConnectionNode>> {
        Ok(self
            .connections
            .read()
            .await
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    async fn list_connections(&self, user_id: Uuid) -> Result<Vec<ConnectionNode>> {
        let mut conns: Vec<ConnectionNode> = self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        conns.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(conns)
    }

    async fn deactivate_connection(&self, user_id: Uuid, id: Uuid) -> Result<bool> {
        match self
            .connections
            .write()
            .await
            .get_mut(&id)
            .filter(|c| c.user_id == user_id)
        {
            Some(c) => {
                c.is_active = false;
                c.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_active_connection(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<ConnectionNode>> {
        Ok(self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id && c.provider == provider && c.is_active)
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn list_active_connections(&self, provider: &str) -> Result<Vec<ConnectionNode>> {
        Ok(self
            .connections
            .read()
            .await
            .values()
            .filter(|c| c.provider == provider && c.is_active)
            .cloned()
            .collect())
    }

    async fn find_connection_by_email(
        &self,
        provider: &str,
        email: &str,
    ) -> Result<Option<ConnectionNode>> {
        Ok(self
            .connections
            .read()
            .await
            .values()
            .filter(|c| {
                c.provider == provider
                    && c.is_active
                    && c.provider_email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .max_by_key(|c| c.updated_at)
            .cloned())
    }

    async fn update_connection_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(c) = self.connections.write().await.get_mut(&id) {
            c.access_token = access_token.to_string();
            c.token_expires_at = Some(expires_at);
            c.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_connection_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(c) = self.connections.write().await.get_mut(&id) {
            c.last_synced = Some(at);
        }
        Ok(())
    }

    // ========================================================================
    // Push subscription operations
    // ========================================================================

    async fn create_subscription(&self, sub: &PushSubscriptionNode) -> Result<()> {
        self.subscriptions.write().await.insert(sub.id, sub.clone());
        Ok(())
    }

    async fn get_active_subscription(
        &self,
        user_id: Uuid,
        provider: WatchProvider,
    ) -> Result<Option<PushSubscriptionNode>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id && s.provider == provider && s.is_active)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<PushSubscriptionNode>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| s.channel_id == channel_id && s.is_active)
            .cloned())
    }

    async fn list_subscriptions(&self, user_id: Uuid) -> Result<Vec<PushSubscriptionNode>> {
        let mut subs: Vec<PushSubscriptionNode> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    async fn deactivate_subscription(&self, id: Uuid) -> Result<()> {
        if let Some(s) = self.subscriptions.write().await.get_mut(&id) {
            s.is_active = false;
            s.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_expiring_subscriptions(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<PushSubscriptionNode>> {
        let mut subs: Vec<PushSubscriptionNode> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.is_active && s.expiration < before)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.expiration);
        Ok(subs)
    }

    async fn record_notification(
        &self,
        id: Uuid,
        history_id: Option<String>,
        sync_token: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(s) = self.subscriptions.write().await.get_mut(&id) {
            s.notification_count += 1;
            s.last_notification_at = Some(at);
            if history_id.is_some() {
                s.history_id = history_id;
            }
            if sync_token.is_some() {
                s.sync_token = sync_token;
            }
            s.updated_at = at;
        }
        Ok(())
    }

    // ========================================================================
    // Calendar event operations
    // ========================================================================

    async fn upsert_calendar_event(&self, event: &CalendarEventNode) -> Result<bool> {
        let mut events = self.calendar_events.write().await;
        let existing = events
            .values_mut()
            .find(|e| e.user_id == event.user_id && e.external_id == event.external_id);
        match existing {
            Some(e) => {
                let id = e.id;
                *e = event.clone();
                e.id = id;
                Ok(false)
            }
            None => {
                events.insert(event.id, event.clone());
                Ok(true)
            }
        }
    }

    async fn delete_calendar_event(&self, user_id: Uuid, external_id: &str) -> Result<bool> {
        let mut events = self.calendar_events.write().await;
        let before = events.len();
        events.retain(|_, e| !(e.user_id == user_id && e.external_id == external_id));
        Ok(events.len() < before)
    }

    async fn list_calendar_events(
        &self,
        user_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEventNode>> {
        let mut events: Vec<CalendarEventNode> = self
            .calendar_events
            .read()
            .await
            .values()
            .filter(|e| {
                e.user_id == user_id && e.start_time.is_some_and(|s| s >= from && s <= to)
            })
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events)
    }

    // ========================================================================
    // Email operations
    // ========================================================================

    async fn upsert_email(&self, email: &EmailNode) -> Result<bool> {
        let mut emails = self.emails.write().await;
        let existing = emails
            .values_mut()
            .find(|e| e.user_id == email.user_id && e.external_id == email.external_id);
        match existing {
            Some(e) => {
                let id = e.id;
                *e = email.clone();
                e.id = id;
                Ok(false)
            }
            None => {
                emails.insert(email.id, email.clone());
                Ok(true)
            }
        }
    }

    async fn delete_email(&self, user_id: Uuid, external_id: &str) -> Result<bool> {
        let mut emails = self.emails.write().await;
        let before = emails.len();
        emails.retain(|_, e| !(e.user_id == user_id && e.external_id == external_id));
        Ok(emails.len() < before)
    }

    async fn get_email(&self, user_id: Uuid, external_id: &str) -> Result<Option<EmailNode>> {
        Ok(self
            .emails
            .read()
            .await
            .values()
            .find(|e| e.user_id == user_id && e.external_id == external_id)
            .cloned())
    }

    async fn update_email_labels(
        &self,
        user_id: Uuid,
        external_id: &str,
        labels: Vec<String>,
    ) -> Result<bool> {
        let mut emails = self.emails.write().await;
        match emails
            .values_mut()
            .find(|e| e.user_id == user_id && e.external_id == external_id)
        {
            Some(e) => {
                e.apply_labels(labels);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_emails(
        &self,
        user_id: Uuid,
        unread_only: bool,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<EmailNode>, usize)> {
        let mut emails: Vec<EmailNode> = self
            .emails
            .read()
            .await
            .values()
            .filter(|e| e.user_id == user_id && (!unread_only || !e.is_read))
            .cloned()
            .collect();
        emails.sort_by(|a, b| b.received_at.cmp(&a.received_at));
        let total = emails.len();
        let page = emails.into_iter().skip(offset).take(limit).collect();
        Ok((page, total))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

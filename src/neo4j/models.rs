//! Record models persisted by the store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deepest level a task may sit at (root = 0, so five levels in total).
pub const MAX_TASK_LEVEL: u32 = 4;

// ============================================================================
// Tasks
// ============================================================================

/// A task in an owner's task tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskNode {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    pub parent_id: Option<Uuid>,
    /// Sibling order under `parent_id`; not unique
    #[serde(default)]
    pub position: i64,
    /// Depth in the tree, always derived from the parent
    pub level: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filters for listing an owner's tasks
#[derive(Debug, Clone)]
pub struct TaskFilters {
    /// `None` = every task, `Some(None)` = root tasks, `Some(Some(id))` = children of `id`
    pub parent: Option<Option<Uuid>>,
    pub include_completed: bool,
}

impl Default for TaskFilters {
    fn default() -> Self {
        Self {
            parent: None,
            include_completed: true,
        }
    }
}

impl TaskFilters {
    pub fn matches(&self, task: &TaskNode) -> bool {
        if !self.include_completed && task.completed {
            return false;
        }
        match self.parent {
            None => true,
            Some(parent) => task.parent_id == parent,
        }
    }
}

/// Sort tasks by (parent_id, position, created_at), root tasks first.
pub fn sort_tasks(tasks: &mut [TaskNode]) {
    tasks.sort_by(|a, b| {
        a.parent_id
            .cmp(&b.parent_id)
            .then(a.position.cmp(&b.position))
            .then(a.created_at.cmp(&b.created_at))
    });
}

// ============================================================================
// Users & OAuth connections
// ============================================================================

/// An application user; the id comes from the identity provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserNode {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A stored OAuth grant for an external provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionNode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub provider_email: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub last_synced: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectionNode {
    /// Read a string entry from the connection's metadata object
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }
}

// ============================================================================
// Push subscriptions
// ============================================================================

/// Which Google resource a watch channel observes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum WatchProvider {
    Gmail,
    Calendar,
}

impl WatchProvider {
    pub const ALL: [WatchProvider; 2] = [WatchProvider::Gmail, WatchProvider::Calendar];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchProvider::Gmail => "gmail",
            WatchProvider::Calendar => "calendar",
        }
    }
}

impl std::fmt::Display for WatchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WatchProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gmail" => Ok(WatchProvider::Gmail),
            "calendar" => Ok(WatchProvider::Calendar),
            other => Err(format!("Unknown provider: {}", other)),
        }
    }
}

/// A registered Google push-notification channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushSubscriptionNode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub provider: WatchProvider,
    pub channel_id: String,
    pub resource_id: Option<String>,
    pub history_id: Option<String>,
    pub sync_token: Option<String>,
    pub expiration: DateTime<Utc>,
    pub is_active: bool,
    #[serde(default)]
    pub notification_count: i64,
    pub last_notification_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Synced provider data
// ============================================================================

/// A calendar event mirrored from Google Calendar
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEventNode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub is_all_day: bool,
    pub status: String,
    pub synced_at: DateTime<Utc>,
    /// Full provider payload
    #[serde(default)]
    pub raw_item: serde_json::Value,
}

/// Attachment metadata extracted from a Gmail message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttachmentInfo {
    pub filename: String,
    pub mime_type: String,
    pub size: i64,
    pub attachment_id: Option<String>,
}

/// An email mirrored from Gmail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailNode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub connection_id: Uuid,
    pub external_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub body: String,
    pub snippet: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub is_read: bool,
    pub is_starred: bool,
    pub is_important: bool,
    pub is_draft: bool,
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<AttachmentInfo>,
    pub synced_at: DateTime<Utc>,
}

impl EmailNode {
    /// Re-derive the flag columns from the label set
    pub fn apply_labels(&mut self, labels: Vec<String>) {
        self.is_read = !labels.iter().any(|l| l == "UNREAD");
        self.is_starred = labels.iter().any(|l| l == "STARRED");
        self.is_important = labels.iter().any(|l| l == "IMPORTANT");
        self.is_draft = labels.iter().any(|l| l == "DRAFT");
        self.labels = labels;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(parent: Option<Uuid>, position: i64, offset_secs: i64) -> TaskNode {
        let at = Utc::now() + chrono::Duration::seconds(offset_secs);
        TaskNode {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            title: "t".into(),
            notes: None,
            due_date: None,
            completed: false,
            parent_id: parent,
            position,
            level: 0,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_sort_roots_first_then_position_then_created() {
        let parent = Uuid::new_v4();
        let child = task(Some(parent), 0, 0);
        let root_late = task(None, 1, 0);
        let root_dup_old = task(None, 0, -10);
        let root_dup_new = task(None, 0, 10);

        let mut tasks = vec![
            child.clone(),
            root_late.clone(),
            root_dup_new.clone(),
            root_dup_old.clone(),
        ];
        sort_tasks(&mut tasks);

        let ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(
            ids,
            vec![root_dup_old.id, root_dup_new.id, root_late.id, child.id]
        );
    }

    #[test]
    fn test_filters_parent_and_completed() {
        let parent = Uuid::new_v4();
        let mut done_child = task(Some(parent), 0, 0);
        done_child.completed = true;
        let root = task(None, 0, 0);

        let roots_only = TaskFilters {
            parent: Some(None),
            include_completed: true,
        };
        assert!(roots_only.matches(&root));
        assert!(!roots_only.matches(&done_child));

        let open_children = TaskFilters {
            parent: Some(Some(parent)),
            include_completed: false,
        };
        assert!(!open_children.matches(&done_child));
        assert!(TaskFilters::default().matches(&done_child));
    }

    #[test]
    fn test_connection_tokens_not_serialized() {
        let now = Utc::now();
        let conn = ConnectionNode {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            provider: "google".into(),
            provider_user_id: "123".into(),
            provider_email: Some("a@example.com".into()),
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            token_expires_at: None,
            scopes: vec![],
            is_active: true,
            metadata: serde_json::json!({}),
            last_synced: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&conn).unwrap();
        assert!(!json.contains("secret-access"));
        assert!(!json.contains("secret-refresh"));
    }

    #[test]
    fn test_watch_provider_parse() {
        assert_eq!("gmail".parse::<WatchProvider>(), Ok(WatchProvider::Gmail));
        assert_eq!(
            "calendar".parse::<WatchProvider>(),
            Ok(WatchProvider::Calendar)
        );
        assert!("outlook".parse::<WatchProvider>().is_err());
    }

    #[test]
    fn test_email_apply_labels() {
        let now = Utc::now();
        let mut email = EmailNode {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            connection_id: Uuid::new_v4(),
            external_id: "m1".into(),
            thread_id: None,
            subject: "s".into(),
            from: "f".into(),
            to: vec![],
            cc: vec![],
            body: String::new(),
            snippet: String::new(),
            labels: vec![],
            is_read: true,
            is_starred: false,
            is_important: false,
            is_draft: false,
            received_at: None,
            attachments: vec![],
            synced_at: now,
        };
        email.apply_labels(vec!["UNREAD".into(), "STARRED".into()]);
        assert!(!email.is_read);
        assert!(email.is_starred);
        assert!(!email.is_draft);
    }
}

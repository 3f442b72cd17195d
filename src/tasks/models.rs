//! Task-related request types and views

use crate::neo4j::models::TaskNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`)
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Request to create a new task.
///
/// There is no `level` field: the level is always derived from the parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub notes: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub parent_id: Option<Uuid>,
    pub position: Option<i64>,
}

/// Request to update a task. Only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpdateTaskRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// `Some(None)` moves the task to the root
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<Option<Uuid>>,
}

impl UpdateTaskRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.notes.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
            && self.position.is_none()
            && self.parent_id.is_none()
    }

    /// Apply the scalar field changes (everything but the parent) to a task
    pub fn apply_fields(&self, task: &mut TaskNode) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref notes) = self.notes {
            task.notes = notes.clone();
        }
        if let Some(due) = self.due_date {
            task.due_date = due;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
    }
}

/// One entry of a bulk reorder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderEntry {
    pub id: Uuid,
    pub position: i64,
}

/// A task with its children nested, for tree views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTreeNode {
    #[serde(flatten)]
    pub task: TaskNode,
    pub children: Vec<TaskTreeNode>,
}

impl TaskTreeNode {
    /// Number of tasks in this subtree, including this one
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }
}

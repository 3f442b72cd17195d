//! Task tree operations

use super::error::{TaskError, TaskResult};
use super::models::*;
use crate::neo4j::models::*;
use crate::neo4j::traits::{RecordStore, TaskWrite};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Manager for an owner's task tree
pub struct TaskManager {
    store: Arc<dyn RecordStore>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Create a task; its level is derived from the parent
    pub async fn create_task(&self, owner_id: Uuid, req: CreateTaskRequest) -> TaskResult<TaskNode> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(TaskError::Validation("Title is required".to_string()));
        }

        if let Some(parent_id) = req.parent_id {
            self.check_parent(owner_id, parent_id).await?;
        }

        let now = Utc::now();
        let task = TaskNode {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            notes: req.notes,
            due_date: req.due_date,
            completed: false,
            parent_id: req.parent_id,
            position: req.position.unwrap_or(0),
            level: 0,
            created_at: now,
            updated_at: now,
        };

        match self.store.create_task(&task).await? {
            Some(created) => {
                tracing::debug!(task_id = %created.id, level = created.level, "Created task");
                Ok(created)
            }
            // The parent changed between the check and the write
            None => match req.parent_id {
                Some(parent_id) => Err(self.classify_parent_failure(owner_id, parent_id).await?),
                None => Err(TaskError::Store(anyhow::anyhow!(
                    "Root task insert returned no row"
                ))),
            },
        }
    }

    pub async fn get_task(&self, owner_id: Uuid, task_id: Uuid) -> TaskResult<TaskNode> {
        self.store
            .get_task(owner_id, task_id)
            .await?
            .ok_or(TaskError::NotFound)
    }

    /// Update a task. Moving it re-derives the level of its whole subtree.
    pub async fn update_task(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        mut req: UpdateTaskRequest,
    ) -> TaskResult<TaskNode> {
        if req.is_empty() {
            return Err(TaskError::Validation("No fields to update".to_string()));
        }
        if let Some(ref title) = req.title {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(TaskError::Validation("Title cannot be empty".to_string()));
            }
            req.title = Some(trimmed.to_string());
        }

        let current = self.get_task(owner_id, task_id).await?;

        if let Some(Some(parent_id)) = req.parent_id {
            if parent_id == task_id {
                return Err(TaskError::InvalidParent);
            }
            if current.parent_id != Some(parent_id) {
                self.check_parent(owner_id, parent_id).await?;
            }
        }

        match self.store.update_task(owner_id, task_id, &req).await? {
            TaskWrite::Written(task) => {
                if current.level != task.level {
                    tracing::debug!(
                        task_id = %task_id,
                        from = current.level,
                        to = task.level,
                        "Task moved"
                    );
                }
                Ok(task)
            }
            TaskWrite::NotFound => Err(TaskError::NotFound),
            TaskWrite::InvalidParent => Err(TaskError::InvalidParent),
            TaskWrite::DepthExceeded => Err(TaskError::DepthExceeded),
        }
    }

    /// Delete a task and all of its descendants, returning how many were removed
    pub async fn delete_task(&self, owner_id: Uuid, task_id: Uuid) -> TaskResult<u64> {
        let deleted = self.store.delete_task_tree(owner_id, task_id).await?;
        if deleted == 0 {
            return Err(TaskError::NotFound);
        }
        tracing::debug!(task_id = %task_id, deleted, "Deleted task tree");
        Ok(deleted)
    }

    pub async fn list_tasks(&self, owner_id: Uuid, filters: &TaskFilters) -> TaskResult<Vec<TaskNode>> {
        Ok(self.store.list_tasks(owner_id, filters).await?)
    }

    /// The owner's tasks nested by parent. Tasks whose parent is filtered out are dropped.
    pub async fn task_tree(
        &self,
        owner_id: Uuid,
        include_completed: bool,
    ) -> TaskResult<Vec<TaskTreeNode>> {
        let filters = TaskFilters {
            parent: None,
            include_completed,
        };
        let tasks = self.store.list_tasks(owner_id, &filters).await?;
        Ok(build_tree(tasks))
    }

    pub async fn set_completed(
        &self,
        owner_id: Uuid,
        task_id: Uuid,
        completed: bool,
    ) -> TaskResult<TaskNode> {
        let req = UpdateTaskRequest {
            completed: Some(completed),
            ..Default::default()
        };
        self.update_task(owner_id, task_id, req).await
    }

    /// Bulk position update; tasks the owner does not have are skipped
    pub async fn reorder(&self, owner_id: Uuid, entries: &[ReorderEntry]) -> TaskResult<Vec<TaskNode>> {
        let positions: Vec<(Uuid, i64)> = entries.iter().map(|e| (e.id, e.position)).collect();
        Ok(self.store.set_task_positions(owner_id, &positions).await?)
    }

    async fn check_parent(&self, owner_id: Uuid, parent_id: Uuid) -> TaskResult<()> {
        match self.store.get_task(owner_id, parent_id).await? {
            None => Err(TaskError::InvalidParent),
            Some(parent) if parent.level >= MAX_TASK_LEVEL => Err(TaskError::DepthExceeded),
            Some(_) => Ok(()),
        }
    }

    async fn classify_parent_failure(&self, owner_id: Uuid, parent_id: Uuid) -> TaskResult<TaskError> {
        Ok(match self.store.get_task(owner_id, parent_id).await? {
            None => TaskError::InvalidParent,
            Some(_) => TaskError::DepthExceeded,
        })
    }
}

/// Nest an ordered task list by parent_id, keeping sibling order
pub fn build_tree(tasks: Vec<TaskNode>) -> Vec<TaskTreeNode> {
    let mut by_parent: HashMap<Option<Uuid>, Vec<TaskNode>> = HashMap::new();
    for task in tasks {
        by_parent.entry(task.parent_id).or_default().push(task);
    }

    fn attach(
        parent: Option<Uuid>,
        by_parent: &mut HashMap<Option<Uuid>, Vec<TaskNode>>,
    ) -> Vec<TaskTreeNode> {
        let children = by_parent.remove(&parent).unwrap_or_default();
        children
            .into_iter()
            .map(|task| {
                let id = task.id;
                TaskTreeNode {
                    task,
                    children: attach(Some(id), by_parent),
                }
            })
            .collect()
    }

    attach(None, &mut by_parent)
}

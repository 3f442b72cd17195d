//! Task tree API handlers

use super::handlers::{ApiState, AppError};
use super::query::{TaskListQuery, TaskTreeQuery};
use crate::auth::extractor::AuthUser;
use crate::neo4j::models::TaskNode;
use crate::tasks::{CreateTaskRequest, ReorderEntry, TaskTreeNode, UpdateTaskRequest};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskNode>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TaskTreeResponse {
    pub tree: Vec<TaskTreeNode>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteTaskResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub tasks: Vec<ReorderEntry>,
}

/// Body of `POST /api/tasks/{id}/complete`; omitted means completed
#[derive(Debug, Deserialize, Default)]
pub struct CompleteRequest {
    #[serde(default = "default_completed")]
    pub completed: bool,
}

fn default_completed() -> bool {
    true
}

/// GET /api/tasks
pub async fn list_tasks(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskListResponse>, AppError> {
    let filters = query.to_filters().map_err(AppError::BadRequest)?;
    let tasks = state.tasks.list_tasks(user.user_id, &filters).await?;
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

/// POST /api/tasks
pub async fn create_task(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskNode>), AppError> {
    let task = state.tasks.create_task(user.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks/tree
pub async fn task_tree(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<TaskTreeQuery>,
) -> Result<Json<TaskTreeResponse>, AppError> {
    let tree = state
        .tasks
        .task_tree(user.user_id, query.include_completed.unwrap_or(true))
        .await?;
    Ok(Json(TaskTreeResponse {
        total: tree.iter().map(|n| n.size()).sum(),
        tree,
    }))
}

/// POST /api/tasks/reorder
pub async fn reorder_tasks(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<TaskListResponse>, AppError> {
    if req.tasks.is_empty() {
        return Err(AppError::BadRequest("No tasks to reorder".to_string()));
    }
    let tasks = state.tasks.reorder(user.user_id, &req.tasks).await?;
    Ok(Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    }))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskNode>, AppError> {
    Ok(Json(state.tasks.get_task(user.user_id, task_id).await?))
}

/// PATCH /api/tasks/{id}
pub async fn update_task(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskNode>, AppError> {
    Ok(Json(
        state.tasks.update_task(user.user_id, task_id, req).await?,
    ))
}

/// DELETE /api/tasks/{id} removes the task and its subtree
pub async fn delete_task(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<DeleteTaskResponse>, AppError> {
    let deleted = state.tasks.delete_task(user.user_id, task_id).await?;
    Ok(Json(DeleteTaskResponse { deleted }))
}

/// POST /api/tasks/{id}/complete
pub async fn complete_task(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(task_id): Path<Uuid>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<TaskNode>, AppError> {
    let completed = body.map(|Json(b)| b.completed).unwrap_or(true);
    Ok(Json(
        state
            .tasks
            .set_completed(user.user_id, task_id, completed)
            .await?,
    ))
}

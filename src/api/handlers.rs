//! Shared API state, error mapping and health handlers

use crate::accounts::{AccountError, AccountManager};
use crate::google::GoogleApi;
use crate::neo4j::traits::RecordStore;
use crate::sync::{SyncError, SyncService};
use crate::tasks::{TaskError, TaskManager};
use crate::{AppState, Config};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

/// Shared server state
pub struct ServerState {
    pub store: Arc<dyn RecordStore>,
    pub tasks: TaskManager,
    pub accounts: AccountManager,
    pub sync: Arc<SyncService>,
    pub google: Arc<dyn GoogleApi>,
    pub config: Arc<Config>,
}

pub type ApiState = Arc<ServerState>;

impl ServerState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        google: Arc<dyn GoogleApi>,
        config: Arc<Config>,
    ) -> ApiState {
        Arc::new(Self {
            tasks: TaskManager::new(store.clone()),
            accounts: AccountManager::new(store.clone()),
            sync: Arc::new(SyncService::new(
                store.clone(),
                google.clone(),
                config.clone(),
            )),
            store,
            google,
            config,
        })
    }

    pub fn from_app(app: &AppState) -> ApiState {
        Self::new(app.store.clone(), app.google.clone(), app.config.clone())
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub store: String,
}

/// GET /health and /api/health
pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let store_ok = match state.store.health_check().await {
        Ok(ok) => ok,
        Err(e) => {
            tracing::warn!("Store health check failed: {}", e);
            false
        }
    };

    let http_status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        http_status,
        Json(HealthResponse {
            status: if store_ok { "ok" } else { "unhealthy" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.config.api_env.clone(),
            store: if store_ok {
                "connected".to_string()
            } else {
                "disconnected".to_string()
            },
        }),
    )
}

// ============================================================================
// Error handling
// ============================================================================

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Internal(anyhow::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    ServiceUnavailable(String),
    /// Task tree failures keep their machine-readable code
    Task(TaskError),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, serde_json::Value) {
        let plain = |status: StatusCode, message: String| {
            (status, serde_json::json!({ "error": message }))
        };
        match self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                plain(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::NotFound(msg) => plain(StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => plain(StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => plain(StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => plain(StatusCode::FORBIDDEN, msg),
            AppError::Conflict(msg) => plain(StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => plain(StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Task(e) => {
                let status = match e {
                    TaskError::NotFound => StatusCode::NOT_FOUND,
                    TaskError::InvalidParent | TaskError::DepthExceeded => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    TaskError::Validation(_) => StatusCode::BAD_REQUEST,
                    TaskError::Store(ref inner) => {
                        tracing::error!("Task store error: {:#}", inner);
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (
                    status,
                    serde_json::json!({ "error": e.to_string(), "code": e.code() }),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        AppError::Task(err)
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::NotFound => AppError::NotFound(err.to_string()),
            AccountError::Forbidden(msg) => AppError::Forbidden(msg),
            AccountError::Validation(msg) => AppError::BadRequest(msg),
            AccountError::Store(e) => AppError::Internal(e),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConnected | SyncError::NotFound(_) => AppError::NotFound(err.to_string()),
            SyncError::ReauthenticationRequired(_) => AppError::Conflict(err.to_string()),
            SyncError::NotConfigured(msg) => AppError::ServiceUnavailable(msg),
            SyncError::Other(e) => AppError::Internal(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_errors_carry_code() {
        let (status, body) = AppError::from(TaskError::DepthExceeded).status_and_body();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "depth_exceeded");

        let (status, body) = AppError::from(TaskError::InvalidParent).status_and_body();
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "invalid_parent");

        let (status, _) = AppError::from(TaskError::NotFound).status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            AppError::from(TaskError::Validation("Title is required".into())).status_and_body();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Title is required");
    }

    #[test]
    fn test_sync_error_mapping() {
        let (status, _) = AppError::from(SyncError::NotFound("Email".into())).status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = AppError::from(SyncError::NotConnected).status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            AppError::from(SyncError::ReauthenticationRequired("expired".into())).status_and_body();
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) =
            AppError::from(SyncError::NotConfigured("no topic".into())).status_and_body();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.get("code").is_none());
    }

    #[test]
    fn test_account_error_mapping() {
        let (status, _) =
            AppError::from(AccountError::Forbidden("not you".into())).status_and_body();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) =
            AppError::from(AccountError::Store(anyhow::anyhow!("down"))).status_and_body();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

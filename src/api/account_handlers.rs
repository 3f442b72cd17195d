//! User and OAuth connection handlers

use super::handlers::{ApiState, AppError};
use crate::accounts::{
    CompleteOAuthRequest, CompleteOAuthResponse, CreateUserRequest, CreateUserResponse,
    SaveConnectionRequest,
};
use crate::auth::extractor::AuthUser;
use crate::neo4j::models::ConnectionNode;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct ConnectionListResponse {
    pub connections: Vec<ConnectionNode>,
}

/// POST /auth/users. 201 when created, 200 when it already existed.
pub async fn create_user(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<CreateUserResponse>), AppError> {
    let resp = state.accounts.create_user(user.user_id, req).await?;
    let status = if resp.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(resp)))
}

/// POST /auth/oauth-connections
pub async fn save_connection(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<SaveConnectionRequest>,
) -> Result<Json<ConnectionNode>, AppError> {
    Ok(Json(state.accounts.save_connection(user.user_id, req).await?))
}

/// GET /auth/oauth-connections
pub async fn list_connections(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Result<Json<ConnectionListResponse>, AppError> {
    let connections = state.accounts.list_connections(user.user_id).await?;
    Ok(Json(ConnectionListResponse { connections }))
}

/// DELETE /auth/oauth-connections/{id}
pub async fn revoke_connection(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(connection_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .accounts
        .revoke_connection(user.user_id, connection_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /auth/complete-oauth
pub async fn complete_oauth(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<CompleteOAuthRequest>,
) -> Result<Json<CompleteOAuthResponse>, AppError> {
    Ok(Json(state.accounts.complete_oauth(user.user_id, req).await?))
}

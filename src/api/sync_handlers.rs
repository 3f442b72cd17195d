//! Calendar, email and watch handlers for the signed-in user

use super::handlers::{ApiState, AppError};
use super::query::{EmailListQuery, GmailSyncQuery, PaginatedResponse, TimeRangeQuery};
use crate::auth::extractor::AuthUser;
use crate::neo4j::models::{CalendarEventNode, EmailNode, WatchProvider};
use crate::sync::gmail::DEFAULT_MAX_RESULTS;
use crate::sync::{
    CalendarSyncReport, GmailSyncReport, ManualSyncReport, WatchInfo, WatchSetupReport,
    WatchStatus,
};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CalendarEventsResponse {
    pub events: Vec<CalendarEventNode>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TodayEventsResponse {
    pub events: Vec<CalendarEventNode>,
    pub count: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct StopWatchResponse {
    pub provider: WatchProvider,
    pub stopped: bool,
}

fn parse_provider(raw: &str) -> Result<WatchProvider, AppError> {
    raw.parse().map_err(AppError::BadRequest)
}

// ============================================================================
// Calendar
// ============================================================================

/// GET /api/calendar/events
pub async fn list_calendar_events(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<TimeRangeQuery>,
) -> Result<Json<CalendarEventsResponse>, AppError> {
    let (from, to) = query.resolve(Utc::now()).map_err(AppError::BadRequest)?;
    let events = state
        .store
        .list_calendar_events(user.user_id, from, to)
        .await?;
    Ok(Json(CalendarEventsResponse { events, from, to }))
}

/// GET /api/calendar/events/today
///
/// Events starting within the current UTC day.
pub async fn todays_events(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Result<Json<TodayEventsResponse>, AppError> {
    let date = Utc::now().date_naive();
    let start = date.and_time(NaiveTime::default()).and_utc();
    let end = start + Duration::days(1) - Duration::nanoseconds(1);
    let events = state
        .store
        .list_calendar_events(user.user_id, start, end)
        .await?;
    Ok(Json(TodayEventsResponse {
        count: events.len(),
        events,
        date,
    }))
}

/// POST /api/sync/calendar
pub async fn sync_calendar(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Result<Json<CalendarSyncReport>, AppError> {
    Ok(Json(state.sync.sync_calendar(user.user_id).await?))
}

// ============================================================================
// Email
// ============================================================================

/// GET /api/email/messages
pub async fn list_emails(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<EmailListQuery>,
) -> Result<Json<PaginatedResponse<EmailNode>>, AppError> {
    query
        .pagination
        .validate()
        .map_err(AppError::BadRequest)?;
    let limit = query.pagination.limit;
    let offset = query.pagination.offset;
    let (emails, total) = state
        .store
        .list_emails(user.user_id, query.unread_only, limit, offset)
        .await?;
    Ok(Json(PaginatedResponse::new(emails, total, limit, offset)))
}

/// GET /api/email/messages/{id}
pub async fn get_email(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EmailNode>, AppError> {
    state
        .store
        .get_email(user.user_id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Email {} not found", id)))
}

/// POST /api/email/messages/{id}/mark-read
pub async fn mark_email_read(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EmailNode>, AppError> {
    Ok(Json(state.sync.mark_email_read(user.user_id, &id, true).await?))
}

/// POST /api/email/messages/{id}/mark-unread
pub async fn mark_email_unread(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EmailNode>, AppError> {
    Ok(Json(state.sync.mark_email_read(user.user_id, &id, false).await?))
}

/// POST /api/email/messages/{id}/archive
pub async fn archive_email(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<EmailNode>, AppError> {
    Ok(Json(state.sync.archive_email(user.user_id, &id).await?))
}

/// POST /api/sync/gmail
pub async fn sync_gmail(
    State(state): State<ApiState>,
    user: AuthUser,
    Query(query): Query<GmailSyncQuery>,
) -> Result<Json<GmailSyncReport>, AppError> {
    let max_results = query.max_results.unwrap_or(DEFAULT_MAX_RESULTS);
    if max_results == 0 || max_results > 500 {
        return Err(AppError::BadRequest(
            "max_results must be between 1 and 500".to_string(),
        ));
    }
    Ok(Json(
        state
            .sync
            .sync_gmail(user.user_id, max_results, query.since)
            .await?,
    ))
}

// ============================================================================
// Watches
// ============================================================================

/// POST /api/watches/{provider}
pub async fn start_watch(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(provider): Path<String>,
) -> Result<Json<WatchInfo>, AppError> {
    let provider = parse_provider(&provider)?;
    Ok(Json(state.sync.start_watch(user.user_id, provider).await?))
}

/// DELETE /api/watches/{provider}
pub async fn stop_watch(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(provider): Path<String>,
) -> Result<Json<StopWatchResponse>, AppError> {
    let provider = parse_provider(&provider)?;
    let stopped = state.sync.stop_watch(user.user_id, provider).await?;
    Ok(Json(StopWatchResponse { provider, stopped }))
}

/// GET /api/watches/status
pub async fn watch_status(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Result<Json<WatchStatus>, AppError> {
    Ok(Json(state.sync.watch_status(user.user_id).await?))
}

/// POST /api/sync/trigger
pub async fn trigger_sync(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Result<Json<ManualSyncReport>, AppError> {
    Ok(Json(state.sync.trigger_sync(user.user_id).await?))
}

/// POST /api/watches/setup
pub async fn setup_watches(
    State(state): State<ApiState>,
    user: AuthUser,
) -> Json<WatchSetupReport> {
    Json(state.sync.setup_watches(user.user_id).await)
}

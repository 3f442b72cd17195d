//! Scheduled job endpoints, authenticated by the shared cron secret

use super::handlers::{ApiState, AppError};
use crate::sync::cron::RENEW_WITHIN_HOURS;
use crate::sync::{
    IncrementalSyncReport, RenewalReport, SetupMissingReport, VerificationReport,
};
use axum::{extract::State, http::HeaderMap, Json};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

#[derive(Debug, Serialize)]
pub struct CronResponse<T> {
    pub status: &'static str,
    pub job: &'static str,
    pub results: T,
}

impl<T> CronResponse<T> {
    fn completed(job: &'static str, results: T) -> Json<Self> {
        Json(Self {
            status: "completed",
            job,
            results,
        })
    }
}

/// Requires `Authorization: Bearer <cron_secret>`. Without a configured
/// secret every request is refused.
fn require_cron_secret(state: &ApiState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        tracing::warn!("Cron request refused: no cron secret configured");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    };
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if !provided.is_some_and(|p| secret_matches(secret, p)) {
        tracing::warn!("Cron request with invalid credentials");
        return Err(AppError::Unauthorized("Unauthorized".to_string()));
    }
    Ok(())
}

/// Constant-time comparison: both sides are MACed under the secret and the
/// tags compared with `verify_slice`
fn secret_matches(secret: &str, provided: &str) -> bool {
    let Ok(mut expected) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    expected.update(secret.as_bytes());
    let Ok(mut candidate) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    candidate.update(provided.as_bytes());
    candidate.verify_slice(&expected.finalize().into_bytes()).is_ok()
}

/// POST /api/cron/renew-watches
pub async fn renew_watches(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CronResponse<RenewalReport>>, AppError> {
    require_cron_secret(&state, &headers)?;
    let report = state.sync.renew_expiring(RENEW_WITHIN_HOURS).await?;
    Ok(CronResponse::completed("renew-watches", report))
}

/// POST /api/cron/incremental-sync
pub async fn incremental_sync(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CronResponse<IncrementalSyncReport>>, AppError> {
    require_cron_secret(&state, &headers)?;
    let report = state.sync.incremental_sync_all().await?;
    Ok(CronResponse::completed("incremental-sync", report))
}

/// POST /api/cron/setup-missing-watches
pub async fn setup_missing_watches(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CronResponse<SetupMissingReport>>, AppError> {
    require_cron_secret(&state, &headers)?;
    let report = state.sync.setup_missing_watches().await?;
    Ok(CronResponse::completed("setup-missing-watches", report))
}

/// POST /api/cron/daily-verification
pub async fn daily_verification(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CronResponse<VerificationReport>>, AppError> {
    require_cron_secret(&state, &headers)?;
    let report = state.sync.daily_verification().await?;
    Ok(CronResponse::completed("daily-verification", report))
}

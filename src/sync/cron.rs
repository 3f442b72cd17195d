//! Batch jobs run by the cron endpoints and CLI

use super::gmail::DEFAULT_MAX_RESULTS;
use super::{
    CalendarSyncReport, GmailSyncReport, SyncError, SyncResult, SyncService, GOOGLE_PROVIDER,
};
use crate::neo4j::models::{ConnectionNode, WatchProvider};
use chrono::{DateTime, Duration, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use uuid::Uuid;

/// Connections synced more recently than this are skipped
pub const RECENT_SYNC_MINUTES: i64 = 10;

/// Default renewal horizon
pub const RENEW_WITHIN_HOURS: i64 = 24;

/// Connections not synced for this long get a full verification sync
pub const STALE_SYNC_HOURS: i64 = 24;

/// Users verified per daily run
const VERIFICATION_BATCH: usize = 50;

/// Gmail window of a verification sync
const VERIFICATION_WINDOW_DAYS: i64 = 30;

/// Users processed concurrently by a batch job
const BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RenewalReport {
    pub total_expiring: usize,
    pub renewed: usize,
    pub errors: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IncrementalSyncReport {
    pub total_users: usize,
    pub success: usize,
    pub skipped: usize,
    pub errors: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SetupMissingReport {
    pub checked: usize,
    pub setup: usize,
    pub errors: usize,
    pub duration_seconds: f64,
}

/// Most recent `last_synced` per user across their active connections
fn latest_sync_per_user(connections: &[ConnectionNode]) -> Vec<(Uuid, Option<DateTime<Utc>>)> {
    let mut latest: BTreeMap<Uuid, Option<DateTime<Utc>>> = BTreeMap::new();
    for conn in connections {
        let entry = latest.entry(conn.user_id).or_default();
        *entry = (*entry).max(conn.last_synced);
    }
    latest.into_iter().collect()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub total_stale: usize,
    pub verified: usize,
    pub errors: usize,
    pub duration_seconds: f64,
}

/// Outcome of one step of a manual sync
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<SyncResult<T>> for StepOutcome<T> {
    fn from(result: SyncResult<T>) -> Self {
        match result {
            Ok(result) => Self {
                success: true,
                result: Some(result),
                error: None,
            },
            Err(e) => Self {
                success: false,
                result: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManualSyncReport {
    pub user_id: Uuid,
    pub gmail: StepOutcome<GmailSyncReport>,
    pub calendar: StepOutcome<CalendarSyncReport>,
}

enum UserSync {
    Synced,
    Skipped,
}

impl SyncService {
    /// Re-register every active watch expiring within `hours`
    pub async fn renew_expiring(&self, hours: i64) -> SyncResult<RenewalReport> {
        let started = Instant::now();
        let expiring = self.expiring_subscriptions(hours).await?;
        tracing::info!(count = expiring.len(), hours, "Renewing expiring watches");

        let targets: Vec<(Uuid, WatchProvider)> =
            expiring.iter().map(|s| (s.user_id, s.provider)).collect();
        let results: Vec<SyncResult<_>> = futures::stream::iter(targets.into_iter())
            .map(|(user_id, provider)| self.renew_watch(user_id, provider))
            .buffer_unordered(BATCH_CONCURRENCY)
            .collect()
            .await;

        let mut report = RenewalReport {
            total_expiring: expiring.len(),
            ..Default::default()
        };
        for result in results {
            match result {
                Ok(_) => report.renewed += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!("Watch renewal failed: {}", e);
                }
            }
        }
        report.duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(renewed = report.renewed, errors = report.errors, "Watch renewal done");
        Ok(report)
    }

    /// Incremental Gmail and Calendar sync for every connected user
    pub async fn incremental_sync_all(&self) -> SyncResult<IncrementalSyncReport> {
        let started = Instant::now();
        let connections = self.store.list_active_connections(GOOGLE_PROVIDER).await?;

        let cutoff = Utc::now() - Duration::minutes(RECENT_SYNC_MINUTES);
        let candidates = latest_sync_per_user(&connections);
        let total_users = candidates.len();

        let results: Vec<(Uuid, SyncResult<UserSync>)> = futures::stream::iter(candidates.into_iter())
            .map(|(user_id, last_synced)| async move {
                if last_synced.is_some_and(|at| at > cutoff) {
                    return (user_id, Ok(UserSync::Skipped));
                }
                (user_id, self.sync_user(user_id).await)
            })
            .buffer_unordered(BATCH_CONCURRENCY)
            .collect()
            .await;

        let mut report = IncrementalSyncReport {
            total_users,
            ..Default::default()
        };
        for (user_id, result) in results {
            match result {
                Ok(UserSync::Synced) => report.success += 1,
                Ok(UserSync::Skipped) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(%user_id, "Incremental sync failed: {}", e);
                }
            }
        }
        report.duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            success = report.success,
            skipped = report.skipped,
            errors = report.errors,
            "Incremental sync done"
        );
        Ok(report)
    }

    /// Gmail first: its window is derived from the previous `last_synced`
    async fn sync_user(&self, user_id: Uuid) -> SyncResult<UserSync> {
        self.sync_gmail_incremental(user_id).await?;
        self.sync_calendar(user_id).await?;
        Ok(UserSync::Synced)
    }

    /// Incremental Gmail then Calendar for one user; each step reports on its own
    pub async fn trigger_sync(&self, user_id: Uuid) -> SyncResult<ManualSyncReport> {
        self.connection(user_id).await?;
        tracing::info!(%user_id, "Manual sync triggered");

        let gmail = self.sync_gmail_incremental(user_id).await;
        if let Err(e) = &gmail {
            tracing::error!(%user_id, "Gmail sync failed: {}", e);
        }
        let calendar = self.sync_calendar(user_id).await;
        if let Err(e) = &calendar {
            tracing::error!(%user_id, "Calendar sync failed: {}", e);
        }
        Ok(ManualSyncReport {
            user_id,
            gmail: gmail.into(),
            calendar: calendar.into(),
        })
    }

    /// Full re-sync for users whose last sync is older than a day
    pub async fn daily_verification(&self) -> SyncResult<VerificationReport> {
        let started = Instant::now();
        let connections = self.store.list_active_connections(GOOGLE_PROVIDER).await?;

        let threshold = Utc::now() - Duration::hours(STALE_SYNC_HOURS);
        let stale: Vec<Uuid> = latest_sync_per_user(&connections)
            .into_iter()
            .filter(|(_, last)| !last.is_some_and(|at| at >= threshold))
            .map(|(user_id, _)| user_id)
            .collect();
        tracing::info!(count = stale.len(), "Users needing verification sync");

        let since = Utc::now() - Duration::days(VERIFICATION_WINDOW_DAYS);
        let total_stale = stale.len();
        let results: Vec<(Uuid, SyncResult<()>)> =
            futures::stream::iter(stale.into_iter().take(VERIFICATION_BATCH))
                .map(|user_id| async move { (user_id, self.verify_user(user_id, since).await) })
                .buffer_unordered(BATCH_CONCURRENCY)
                .collect()
                .await;

        let mut report = VerificationReport {
            total_stale,
            ..Default::default()
        };
        for (user_id, result) in results {
            match result {
                Ok(()) => report.verified += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::error!(%user_id, "Verification sync failed: {}", e);
                }
            }
        }
        report.duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            verified = report.verified,
            errors = report.errors,
            "Daily verification done"
        );
        Ok(report)
    }

    async fn verify_user(&self, user_id: Uuid, since: DateTime<Utc>) -> SyncResult<()> {
        self.sync_gmail(user_id, DEFAULT_MAX_RESULTS, Some(since))
            .await?;
        self.sync_calendar(user_id).await?;
        Ok(())
    }

    /// Start watches for connected users missing one
    pub async fn setup_missing_watches(&self) -> SyncResult<SetupMissingReport> {
        let started = Instant::now();
        let connections = self.store.list_active_connections(GOOGLE_PROVIDER).await?;
        let users: BTreeSet<Uuid> = connections.iter().map(|c| c.user_id).collect();

        let mut report = SetupMissingReport {
            checked: users.len(),
            ..Default::default()
        };
        for user_id in users {
            for provider in WatchProvider::ALL {
                if self
                    .store
                    .get_active_subscription(user_id, provider)
                    .await?
                    .is_some()
                {
                    continue;
                }
                match self.start_watch(user_id, provider).await {
                    Ok(_) => report.setup += 1,
                    Err(SyncError::NotConfigured(reason)) => {
                        tracing::debug!(%user_id, %provider, "Skipping watch: {}", reason);
                    }
                    Err(e) => {
                        report.errors += 1;
                        tracing::error!(%user_id, %provider, "Watch setup failed: {}", e);
                    }
                }
            }
        }
        report.duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(setup = report.setup, errors = report.errors, "Missing watch setup done");
        Ok(report)
    }
}

//! Google Calendar and Gmail synchronization
//!
//! [`SyncService`] pulls provider data into the record store, manages push
//! channels (watches) and processes the notifications they deliver. Nothing
//! here runs on a timer: renewal and periodic sync are driven by the cron
//! endpoints and CLI subcommands.

pub mod calendar;
pub mod cron;
pub mod gmail;
pub mod notifications;
pub mod watch;

pub use calendar::CalendarSyncReport;
pub use cron::{
    IncrementalSyncReport, ManualSyncReport, RenewalReport, SetupMissingReport, VerificationReport,
};
pub use gmail::GmailSyncReport;
pub use notifications::NotificationOutcome;
pub use watch::{WatchInfo, WatchSetupReport, WatchStatus};

use crate::auth::google::{TokenError, TokenManager};
use crate::google::GoogleApi;
use crate::neo4j::models::ConnectionNode;
use crate::neo4j::traits::RecordStore;
use crate::Config;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Provider name of Google OAuth connections
pub const GOOGLE_PROVIDER: &str = "google";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("No active Google connection for user")]
    NotConnected,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Reauthentication required: {0}")]
    ReauthenticationRequired(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<TokenError> for SyncError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::ReauthenticationRequired(msg) => SyncError::ReauthenticationRequired(msg),
            TokenError::Other(e) => SyncError::Other(e),
        }
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;

pub struct SyncService {
    store: Arc<dyn RecordStore>,
    google: Arc<dyn GoogleApi>,
    tokens: TokenManager,
    config: Arc<Config>,
}

impl SyncService {
    pub fn new(store: Arc<dyn RecordStore>, google: Arc<dyn GoogleApi>, config: Arc<Config>) -> Self {
        let tokens = TokenManager::new(store.clone(), google.clone(), &config.google);
        Self {
            store,
            google,
            tokens,
            config,
        }
    }

    /// The user's active Google connection
    async fn connection(&self, user_id: Uuid) -> SyncResult<ConnectionNode> {
        self.store
            .get_active_connection(user_id, GOOGLE_PROVIDER)
            .await?
            .ok_or(SyncError::NotConnected)
    }

    /// The user's active Google connection with a usable access token
    async fn authorized(&self, user_id: Uuid) -> SyncResult<(ConnectionNode, String)> {
        let conn = self.connection(user_id).await?;
        let token = self.tokens.access_token(&conn).await?;
        Ok((conn, token))
    }
}

use chrono::{DateTime, Utc};
use dav_api::{ApiError, TableId, UploadStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SyncMode {
    /// Push, then pull every table
    Full,
    PushOnly,
}

/// Observable state of the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SyncPhase {
    #[default]
    Idle,
    Pushing,
    Pulling,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Shared objects whose access was given up
    pub removed: usize,
    /// File contents uploaded after a create or update
    pub files_uploaded: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PullStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped_pending: usize,
    /// Tables whose every page was processed in this pass
    pub tables_completed: Vec<TableId>,
}

/// A push of one table object or notification that did not go through
#[derive(Debug, Clone, PartialEq)]
pub struct PushFailure {
    /// Table of the object; `None` for a notification
    pub table_id: Option<TableId>,
    pub uuid: Uuid,
    /// Status of the object when the push was attempted (left unchanged)
    pub status: UploadStatus,
    pub error: SyncError,
}

/// Outcome of one sync pass, handed to `on_sync_finished`
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub pass: u64,
    pub mode: SyncMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pushed: PushStats,
    pub pushed_notifications: PushStats,
    pub push_failures: Vec<PushFailure>,
    /// The pending objects could not be enumerated
    pub push_error: Option<SyncError>,
    pub pulled: PullStats,
    /// The pull stopped early; later pages of this pass were not fetched
    pub pull_error: Option<SyncError>,
    /// Why the last session renewal attempted during this pass failed
    ///
    /// Renewal failures surface as `AuthorizationExpired` on the call that needed
    /// them; this keeps the underlying cause, e.g. a network error.
    pub renewal_failure: Option<ApiError>,
    pub cancelled: bool,
}

impl SyncReport {
    pub(crate) fn new(pass: u64, mode: SyncMode) -> Self {
        let now = Utc::now();
        Self {
            pass,
            mode,
            started_at: now,
            finished_at: now,
            pushed: PushStats::default(),
            pushed_notifications: PushStats::default(),
            push_failures: Vec::new(),
            push_error: None,
            pulled: PullStats::default(),
            pull_error: None,
            renewal_failure: None,
            cancelled: false,
        }
    }

    /// Every push went through and the pull (if any) ran to the end
    pub fn is_success(&self) -> bool {
        self.push_failures.is_empty()
            && self.push_error.is_none()
            && self.pull_error.is_none()
            && !self.cancelled
    }
}

use dav_api::{TableId, TableObject};

use super::report::SyncReport;

/// Notification sink for sync progress
///
/// Callbacks run inline on the sync task and should return quickly.
pub trait SyncCallbacks: Send + Sync {
    /// A table finished its pull; `changed` is true if any object was inserted,
    /// updated or removed
    fn on_collection_changed(&self, _table_id: TableId, _changed: bool) {}

    fn on_entity_updated(&self, _object: &TableObject) {}

    fn on_entity_deleted(&self, _object: &TableObject) {}

    /// Fires exactly once per pass that ran, whatever its outcome
    fn on_sync_finished(&self, _report: &SyncReport) {}
}

pub struct NoopCallbacks;

impl SyncCallbacks for NoopCallbacks {}

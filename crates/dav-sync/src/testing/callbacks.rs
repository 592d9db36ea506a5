use dav_api::{TableId, TableObject};
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;
use crate::sync::{SyncCallbacks, SyncReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    CollectionChanged { table_id: TableId, changed: bool },
    EntityUpdated(Uuid),
    EntityDeleted(Uuid),
    SyncFinished { pass: u64 },
}

/// Records every notification in arrival order
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
    reports: Mutex<Vec<SyncReport>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        lock(&self.events).clone()
    }

    /// Only the per-object notifications
    pub fn entity_events(&self) -> Vec<CallbackEvent> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    CallbackEvent::EntityUpdated(_) | CallbackEvent::EntityDeleted(_)
                )
            })
            .collect()
    }

    pub fn finished_reports(&self) -> Vec<SyncReport> {
        lock(&self.reports).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
        lock(&self.reports).clear();
    }
}

impl SyncCallbacks for RecordingCallbacks {
    fn on_collection_changed(&self, table_id: TableId, changed: bool) {
        lock(&self.events).push(CallbackEvent::CollectionChanged { table_id, changed });
    }

    fn on_entity_updated(&self, object: &TableObject) {
        lock(&self.events).push(CallbackEvent::EntityUpdated(object.uuid));
    }

    fn on_entity_deleted(&self, object: &TableObject) {
        lock(&self.events).push(CallbackEvent::EntityDeleted(object.uuid));
    }

    fn on_sync_finished(&self, report: &SyncReport) {
        lock(&self.events).push(CallbackEvent::SyncFinished { pass: report.pass });
        lock(&self.reports).push(report.clone());
    }
}

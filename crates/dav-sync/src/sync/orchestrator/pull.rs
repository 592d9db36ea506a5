use dav_api::{ApiError, RemoteObjectRef, TableId, TablePage};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Flow, SyncOrchestrator};
use crate::error::SyncError;
use crate::sync::fetch_order::fetch_order;
use crate::sync::ledger::ApplyOutcome;
use crate::sync::report::{PullStats, SyncReport};

/// Pull progress of one table within a pass
#[derive(Default)]
struct TableProgress {
    pages_fetched: u32,
    listed: HashSet<Uuid>,
    changed: bool,
}

impl SyncOrchestrator {
    /// Pull every table; the first failure aborts the rest of the schedule
    pub(super) async fn pull_phase(&self, pass: u64, report: &mut SyncReport) -> Flow {
        match self.pull_tables(pass, &mut report.pulled).await {
            Ok(flow) => flow,
            Err(e) => {
                warn!("[SyncOrchestrator] pull aborted: {}", e);
                report.pull_error = Some(e);
                Flow::Continue
            }
        }
    }

    async fn pull_tables(&self, pass: u64, stats: &mut PullStats) -> Result<Flow, SyncError> {
        // Page 1 tells how many pages each table owes; it is kept for the first step
        let mut first_pages: HashMap<TableId, TablePage> = HashMap::new();
        let mut page_counts: HashMap<TableId, u32> = HashMap::new();
        for &table_id in &self.table_ids {
            if self.is_cancelled(pass) {
                return Ok(Flow::Cancelled);
            }
            let page = self.fetch_page(table_id, 1).await?;
            if self.is_cancelled(pass) {
                return Ok(Flow::Cancelled);
            }
            page_counts.insert(table_id, page.pages);
            first_pages.insert(table_id, page);
        }

        let mut progress: HashMap<TableId, TableProgress> = HashMap::new();
        for &table_id in &self.table_ids {
            if page_counts.get(&table_id).copied().unwrap_or(0) == 0 {
                self.finish_table(table_id, TableProgress::default(), stats)
                    .await?;
            }
        }

        let order = fetch_order(&self.table_ids, &self.parallel_table_ids, &page_counts);
        debug!("[SyncOrchestrator] fetch order: {:?}", order);

        for table_id in order {
            let state = progress.entry(table_id).or_default();
            state.pages_fetched += 1;
            let page_number = state.pages_fetched;

            let cached = if page_number == 1 {
                first_pages.remove(&table_id)
            } else {
                None
            };
            let page = match cached {
                Some(page) => page,
                None => {
                    if self.is_cancelled(pass) {
                        return Ok(Flow::Cancelled);
                    }
                    self.fetch_page(table_id, page_number).await?
                }
            };
            if self.is_cancelled(pass) {
                return Ok(Flow::Cancelled);
            }

            for entry in page.objects {
                state.listed.insert(entry.uuid);
                self.reconcile(table_id, entry, state, stats).await?;
                if self.is_cancelled(pass) {
                    return Ok(Flow::Cancelled);
                }
            }

            let owed = page_counts.get(&table_id).copied().unwrap_or(0);
            if page_number >= owed {
                if let Some(state) = progress.remove(&table_id) {
                    self.finish_table(table_id, state, stats).await?;
                }
            }
        }

        Ok(Flow::Continue)
    }

    async fn fetch_page(&self, table_id: TableId, page: u32) -> Result<TablePage, SyncError> {
        debug!("[SyncOrchestrator] fetching table {} page {}", table_id, page);
        let page = self
            .guard
            .call(None, |credential| async move {
                self.remote.get_table_page(&credential, table_id, page).await
            })
            .await?;
        Ok(page)
    }

    /// Bring one listed object up to date; only objects with a new tag are fetched
    async fn reconcile(
        &self,
        table_id: TableId,
        entry: RemoteObjectRef,
        state: &mut TableProgress,
        stats: &mut PullStats,
    ) -> Result<(), SyncError> {
        let uuid = entry.uuid;
        if let Some(local) = self.ledger.get(table_id, uuid).await? {
            if local.upload_status.needs_upload() {
                stats.skipped_pending += 1;
                return Ok(());
            }
            if local.etag.as_deref() == Some(entry.etag.as_str()) {
                stats.unchanged += 1;
                return Ok(());
            }
        }

        let result = self
            .guard
            .call(None, |credential| async move {
                self.remote.get_table_object(&credential, uuid).await
            })
            .await;
        let remote = match result {
            Ok(remote) => remote,
            Err(ApiError::NotFound(_)) => {
                if let Some(removed) = self.ledger.remove_remote_deleted(table_id, uuid).await? {
                    stats.deleted += 1;
                    state.changed = true;
                    self.callbacks.on_entity_deleted(&removed);
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        match self.ledger.apply_remote(remote).await? {
            ApplyOutcome::Inserted(object) => {
                stats.inserted += 1;
                state.changed = true;
                self.callbacks.on_entity_updated(&object);
            }
            ApplyOutcome::Updated(object) => {
                stats.updated += 1;
                state.changed = true;
                self.callbacks.on_entity_updated(&object);
            }
            ApplyOutcome::Unchanged => stats.unchanged += 1,
            ApplyOutcome::SkippedPending => stats.skipped_pending += 1,
        }
        Ok(())
    }

    /// Drop objects the server no longer lists and report the table as done
    async fn finish_table(
        &self,
        table_id: TableId,
        state: TableProgress,
        stats: &mut PullStats,
    ) -> Result<(), SyncError> {
        let removed = self.ledger.remove_unlisted(table_id, &state.listed).await?;
        for object in &removed {
            self.callbacks.on_entity_deleted(object);
        }
        stats.deleted += removed.len();
        stats.tables_completed.push(table_id);

        let changed = state.changed || !removed.is_empty();
        debug!(
            "[SyncOrchestrator] table {} complete (changed: {})",
            table_id, changed
        );
        self.callbacks.on_collection_changed(table_id, changed);
        Ok(())
    }
}

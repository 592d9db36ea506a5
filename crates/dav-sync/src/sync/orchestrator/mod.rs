//! Sync pass driver
//!
//! A pass pushes every pending local mutation (table objects first, then
//! notifications when a notification remote is configured), then (for full
//! passes) pulls each configured table page by page in `fetch_order`. Passes are serialized by
//! `history`; a trigger that queued behind a running pass is satisfied by any
//! qualifying pass that started after it arrived.

mod pull;
mod push;

use chrono::Utc;
use dav_api::{NotificationRemote, TableId, TableObjectRemote};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use super::callbacks::{NoopCallbacks, SyncCallbacks};
use super::ledger::UploadLedger;
use super::report::{SyncMode, SyncPhase, SyncReport};
use crate::auth::CredentialGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Cancelled,
}

#[derive(Default)]
struct PassHistory {
    last: Option<SyncReport>,
    last_full: Option<SyncReport>,
}

impl PassHistory {
    /// Report of a pass that started after `requested_after` and satisfies `mode`
    fn covering(&self, mode: SyncMode, requested_after: u64) -> Option<SyncReport> {
        let candidate = match mode {
            SyncMode::PushOnly => self.last.as_ref(),
            SyncMode::Full => self.last_full.as_ref(),
        };
        candidate.filter(|r| r.pass > requested_after).cloned()
    }

    fn record(&mut self, report: &SyncReport) {
        if report.mode == SyncMode::Full {
            self.last_full = Some(report.clone());
        }
        self.last = Some(report.clone());
    }
}

pub struct SyncOrchestrator {
    ledger: Arc<UploadLedger>,
    guard: CredentialGuard,
    remote: Arc<dyn TableObjectRemote>,
    notifications: Option<Arc<dyn NotificationRemote>>,
    callbacks: Arc<dyn SyncCallbacks>,
    table_ids: Vec<TableId>,
    parallel_table_ids: Vec<TableId>,
    history: Mutex<PassHistory>,
    passes_started: AtomicU64,
    cancel_through: AtomicU64,
    phase: watch::Sender<SyncPhase>,
}

impl SyncOrchestrator {
    pub fn new(
        ledger: Arc<UploadLedger>,
        guard: CredentialGuard,
        remote: Arc<dyn TableObjectRemote>,
        table_ids: Vec<TableId>,
    ) -> Self {
        let mut unique = Vec::with_capacity(table_ids.len());
        for table_id in table_ids {
            if !unique.contains(&table_id) {
                unique.push(table_id);
            }
        }
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            ledger,
            guard,
            remote,
            notifications: None,
            callbacks: Arc::new(NoopCallbacks),
            table_ids: unique,
            parallel_table_ids: Vec::new(),
            history: Mutex::new(PassHistory::default()),
            passes_started: AtomicU64::new(0),
            cancel_through: AtomicU64::new(0),
            phase,
        }
    }

    /// Tables whose pages are fetched round-robin once all of them have started
    pub fn with_parallel_tables(mut self, parallel_table_ids: Vec<TableId>) -> Self {
        self.parallel_table_ids = parallel_table_ids;
        self
    }

    /// Also push pending notifications after the table objects
    pub fn with_notification_remote(mut self, notifications: Arc<dyn NotificationRemote>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn SyncCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn ledger(&self) -> &Arc<UploadLedger> {
        &self.ledger
    }

    pub fn guard(&self) -> &CredentialGuard {
        &self.guard
    }

    pub fn table_ids(&self) -> &[TableId] {
        &self.table_ids
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    /// Abandon the running pass, if any
    ///
    /// The in-flight remote call completes, its result is discarded and the pass
    /// ends before its next step. Later passes are not affected.
    pub fn cancel(&self) {
        let current = self.passes_started.load(Ordering::SeqCst);
        self.cancel_through.fetch_max(current, Ordering::SeqCst);
        info!("[SyncOrchestrator] cancellation requested for pass {}", current);
    }

    /// Push pending mutations, then pull every table
    #[instrument(skip(self))]
    pub async fn sync(&self) -> SyncReport {
        self.run(SyncMode::Full).await
    }

    /// Push pending mutations only
    #[instrument(skip(self))]
    pub async fn push(&self) -> SyncReport {
        self.run(SyncMode::PushOnly).await
    }

    fn is_cancelled(&self, pass: u64) -> bool {
        self.cancel_through.load(Ordering::SeqCst) >= pass
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    async fn run(&self, mode: SyncMode) -> SyncReport {
        let requested_after = self.passes_started.load(Ordering::SeqCst);
        let mut history = self.history.lock().await;
        if let Some(report) = history.covering(mode, requested_after) {
            debug!(
                "[SyncOrchestrator] {:?} trigger joined pass {}",
                mode, report.pass
            );
            return report;
        }

        let pass = self.passes_started.fetch_add(1, Ordering::SeqCst) + 1;
        let mut report = SyncReport::new(pass, mode);
        let renewal_failures = self.guard.session().renewal_failure_count();
        info!("[SyncOrchestrator] pass {} ({:?}) started", pass, mode);

        self.set_phase(SyncPhase::Pushing);
        let mut flow = self.push_phase(pass, &mut report).await;
        if flow == Flow::Continue && mode == SyncMode::Full {
            self.set_phase(SyncPhase::Pulling);
            flow = self.pull_phase(pass, &mut report).await;
        }
        self.set_phase(SyncPhase::Idle);

        if self.guard.session().renewal_failure_count() > renewal_failures {
            report.renewal_failure = self.guard.session().last_renewal_failure().await;
            warn!(
                "[SyncOrchestrator] pass {} could not renew the session: {:?}",
                pass, report.renewal_failure
            );
        }
        report.cancelled = flow == Flow::Cancelled;
        report.finished_at = Utc::now();
        info!(
            "[SyncOrchestrator] pass {} finished: pushed {:?}, notifications {:?}, pulled {:?}, {} push failures, pull error: {:?}, cancelled: {}",
            pass,
            report.pushed,
            report.pushed_notifications,
            report.pulled,
            report.push_failures.len(),
            report.pull_error,
            report.cancelled
        );

        history.record(&report);
        self.callbacks.on_sync_finished(&report);
        report
    }
}

//! The synchronization core
//!
//! - `ledger` - upload-status bookkeeping over a `LocalStore`
//! - `fetch_order` - which table page to pull next
//! - `orchestrator` - push-then-pull passes
//! - `report` / `callbacks` - what a pass tells the outside world

pub mod callbacks;
pub mod fetch_order;
pub mod ledger;
pub mod orchestrator;
pub mod report;

pub use callbacks::{NoopCallbacks, SyncCallbacks};
pub use fetch_order::fetch_order;
pub use ledger::{ApplyOutcome, MutationKind, MutationOutcome, UploadLedger};
pub use orchestrator::SyncOrchestrator;
pub use report::{PullStats, PushFailure, PushStats, SyncMode, SyncPhase, SyncReport};

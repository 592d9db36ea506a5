//! Synchronization core for dav table objects
//!
//! - `auth` - explicit session state and the credential guard that renews it once on expiry
//! - `sync` - upload-status ledger, table fetch scheduler and the sync orchestrator
//! - `storage` - in-memory `LocalStore` and the table-object key scheme
//! - `config` - `DavConfig` and environment loading
//! - `logging` - tracing subscriber setup
//! - `testing` - scripted collaborators for tests (`test-helpers` feature)

pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod sync;

#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;

pub use auth::{CredentialGuard, Session};
pub use config::{ConfigError, DavConfig, Environment, PushOnSave};
pub use error::SyncError;
pub use storage::MemoryStore;
pub use sync::{
    fetch_order, ApplyOutcome, MutationKind, MutationOutcome, NoopCallbacks, PullStats,
    PushFailure, PushStats, SyncCallbacks, SyncMode, SyncOrchestrator, SyncPhase, SyncReport,
    UploadLedger,
};

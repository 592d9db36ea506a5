//! Session state and credential renewal
//!
//! The single active credential lives in an explicit `Session` object shared by
//! every caller. `CredentialGuard` wraps remote calls and performs at most one
//! renewal-and-replay per call; concurrent renewals collapse into one.

mod guard;
mod session;

pub use guard::CredentialGuard;
pub use session::Session;

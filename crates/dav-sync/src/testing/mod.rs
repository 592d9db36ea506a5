//! Scripted collaborators for exercising the sync core without a server

mod callbacks;
mod remote;
mod renewer;

pub use callbacks::{CallbackEvent, RecordingCallbacks};
pub use remote::{RemoteCall, RemoteOp, ScriptedRemote};
pub use renewer::StaticRenewer;

use std::sync::{Mutex, MutexGuard};

// Test doubles keep working after a panicking assertion in another task
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

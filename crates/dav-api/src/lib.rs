//! Shared types for the dav-sync workspace
//!
//! This crate holds everything the synchronization core and its adapters agree on:
//! - `value` - scalar property values carried by table objects
//! - `entity` - `TableObject`, its `UploadStatus` and file payloads
//! - `notification` - scheduled notifications
//! - `error` - the remote (`ApiError`) and local (`StoreError`) error taxonomy
//! - `transport` - the request/response envelope and the `Transport` trait
//! - `traits` - the remaining collaborator contracts (store, session renewal, remote endpoints)

pub mod entity;
pub mod error;
pub mod notification;
pub mod traits;
pub mod transport;
pub mod value;

pub use entity::{FilePayload, TableId, TableObject, UploadStatus};
pub use error::{ApiError, ApiErrorDetail, StoreError, StoreResult};
pub use notification::Notification;
pub use traits::{
    Credentials, LocalStore, NotificationRemote, RemoteObjectRef, SessionRenewer,
    TableObjectRemote, TablePage,
};
pub use transport::{ApiRequest, ApiResponse, Method, RequestBody, Transport};
pub use value::Value;

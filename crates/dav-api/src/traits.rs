//! Collaborator contracts consumed by the synchronization core

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{FilePayload, TableId, TableObject};
use crate::error::{ApiError, StoreResult};
use crate::notification::Notification;

/// Local persistent store for table objects
///
/// The store owns object bodies; upload status is persisted alongside but only
/// the ledger decides its transitions.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, table_id: TableId, uuid: Uuid) -> StoreResult<Option<TableObject>>;

    /// Insert or replace an object
    async fn put(&self, object: TableObject) -> StoreResult<()>;

    /// Remove an object, returning it if it existed
    async fn delete(&self, table_id: TableId, uuid: Uuid) -> StoreResult<Option<TableObject>>;

    /// Objects whose upload status needs a push, optionally limited to one table
    async fn list_pending(&self, table_id: Option<TableId>) -> StoreResult<Vec<TableObject>>;

    /// Every object stored for a table
    async fn list_collection(&self, table_id: TableId) -> StoreResult<Vec<TableObject>>;

    /// Locally stored content of a file table object
    async fn get_file(&self, uuid: Uuid) -> StoreResult<Option<FilePayload>>;

    async fn put_file(&self, uuid: Uuid, file: FilePayload) -> StoreResult<()>;

    async fn delete_file(&self, uuid: Uuid) -> StoreResult<Option<FilePayload>>;

    async fn get_notification(&self, uuid: Uuid) -> StoreResult<Option<Notification>>;

    /// Insert or replace a notification
    async fn put_notification(&self, notification: Notification) -> StoreResult<()>;

    async fn delete_notification(&self, uuid: Uuid) -> StoreResult<Option<Notification>>;

    /// Every stored notification, in storage order
    async fn list_notifications(&self) -> StoreResult<Vec<Notification>>;
}

/// Session credentials: the access credential sent with each call and the
/// refresh credential exchanged for a new one on expiry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }
}

/// Exchanges a refresh credential for fresh session credentials
#[async_trait]
pub trait SessionRenewer: Send + Sync {
    async fn renew(&self, refresh_token: &str) -> Result<Credentials, ApiError>;
}

/// Entry of a table page listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectRef {
    pub uuid: Uuid,
    pub etag: String,
}

/// One page of a remote table listing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TablePage {
    pub table_id: TableId,
    /// Total number of pages the server holds for this table
    pub pages: u32,
    pub objects: Vec<RemoteObjectRef>,
}

/// Per-endpoint contract for table objects
///
/// Every call receives the credential to send; the credential guard decides
/// which one that is.
#[async_trait]
pub trait TableObjectRemote: Send + Sync {
    async fn create_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError>;

    async fn get_table_object(&self, credential: &str, uuid: Uuid)
    -> Result<TableObject, ApiError>;

    async fn update_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError>;

    async fn delete_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError>;

    /// Upload the content of a file object; returns the object with its new tag
    async fn set_table_object_file(
        &self,
        credential: &str,
        uuid: Uuid,
        file: &FilePayload,
    ) -> Result<TableObject, ApiError>;

    /// Give up access to an object shared by another user, leaving it on the server
    async fn remove_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError>;

    /// Fetch a 1-based page of a table's object listing
    async fn get_table_page(
        &self,
        credential: &str,
        table_id: TableId,
        page: u32,
    ) -> Result<TablePage, ApiError>;
}

/// Endpoints for scheduled notifications
#[async_trait]
pub trait NotificationRemote: Send + Sync {
    async fn create_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError>;

    async fn update_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError>;

    async fn delete_notification(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError>;
}

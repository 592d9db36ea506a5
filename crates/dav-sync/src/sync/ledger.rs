//! Upload-status ledger
//!
//! The ledger is the only component that changes `UploadStatus`. Every
//! read-decide-write runs under one async lock so local edits, pushes and pulls
//! never interleave on the same object.

use dav_api::{
    FilePayload, LocalStore, Notification, StoreError, StoreResult, TableId, TableObject,
    UploadStatus,
};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Kind of a local edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    /// Give up access to an object shared by another user
    Remove,
}

/// What a local edit did to the stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Stored(UploadStatus),
    /// The record never reached the server and was dropped outright
    Removed,
}

/// Result of reconciling one pulled object
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Inserted(TableObject),
    Updated(TableObject),
    Unchanged,
    /// A local edit is waiting to be pushed; the pulled copy was ignored
    SkippedPending,
}

/// Effect of a local edit on a stored record's upload status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Store(UploadStatus),
    /// Drop the record locally; the server never saw it
    Drop,
    /// Already on its way out; nothing to write
    Keep(UploadStatus),
    /// Delete or remove of a record that does not exist
    Missing,
}

/// Upload-status transition for a local edit of a table object or notification
fn local_transition(
    uuid: Uuid,
    current: Option<UploadStatus>,
    kind: MutationKind,
) -> StoreResult<Transition> {
    use UploadStatus::*;

    let transition = match (kind, current) {
        (MutationKind::Delete | MutationKind::Remove, None) => Transition::Missing,
        (MutationKind::Delete | MutationKind::Remove, Some(New | NoUpload)) => Transition::Drop,
        (MutationKind::Delete | MutationKind::Remove, Some(status @ (Deleted | Removed))) => {
            Transition::Keep(status)
        }
        (MutationKind::Delete, Some(UpToDate | Updated)) => Transition::Store(Deleted),
        (MutationKind::Remove, Some(UpToDate | Updated)) => Transition::Store(Removed),
        (MutationKind::Create | MutationKind::Update, None | Some(New)) => Transition::Store(New),
        (MutationKind::Create | MutationKind::Update, Some(UpToDate | Updated)) => {
            Transition::Store(Updated)
        }
        (MutationKind::Create | MutationKind::Update, Some(NoUpload)) => {
            Transition::Store(NoUpload)
        }
        (MutationKind::Create | MutationKind::Update, Some(from @ (Deleted | Removed))) => {
            return Err(StoreError::InvalidTransition {
                uuid,
                from,
                action: "update",
            });
        }
    };
    Ok(transition)
}

/// Status after the server confirmed a create or update of `pushed`
///
/// Edits made while the push was in flight keep the record `Updated`; a record
/// deleted or removed in the meantime keeps that status for the next push.
fn confirmed_status(current: UploadStatus, unchanged_since_push: bool) -> UploadStatus {
    match current {
        UploadStatus::Deleted | UploadStatus::Removed | UploadStatus::NoUpload => current,
        _ if unchanged_since_push => UploadStatus::UpToDate,
        _ => UploadStatus::Updated,
    }
}

enum Cursor {
    Start,
    Keys(VecDeque<(TableId, Uuid)>),
    Done,
}

pub struct UploadLedger {
    store: Arc<dyn LocalStore>,
    write_lock: Mutex<()>,
}

impl UploadLedger {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub async fn get(&self, table_id: TableId, uuid: Uuid) -> StoreResult<Option<TableObject>> {
        self.store.get(table_id, uuid).await
    }

    /// Upload status of a tracked object; `NotFound` once it has been removed
    pub async fn status(&self, table_id: TableId, uuid: Uuid) -> StoreResult<UploadStatus> {
        self.store
            .get(table_id, uuid)
            .await?
            .map(|object| object.upload_status)
            .ok_or(StoreError::NotFound { table_id, uuid })
    }

    /// Record a local create, update, delete or remove and persist the result
    ///
    /// The stored version tag is kept across edits; the status of `object` is ignored.
    pub async fn record_local_mutation(
        &self,
        object: TableObject,
        kind: MutationKind,
    ) -> StoreResult<MutationOutcome> {
        let _guard = self.write_lock.lock().await;
        self.apply_local_mutation(object, kind).await
    }

    /// Store the content of a file object and record the object as created or edited
    pub async fn record_file(
        &self,
        mut object: TableObject,
        file: FilePayload,
    ) -> StoreResult<MutationOutcome> {
        let _guard = self.write_lock.lock().await;
        let kind = match self.store.get(object.table_id, object.uuid).await? {
            Some(_) => MutationKind::Update,
            None => MutationKind::Create,
        };
        object.file = true;
        let outcome = self.apply_local_mutation(object.clone(), kind).await?;
        self.store.put_file(object.uuid, file).await?;
        Ok(outcome)
    }

    async fn apply_local_mutation(
        &self,
        mut object: TableObject,
        kind: MutationKind,
    ) -> StoreResult<MutationOutcome> {
        let (table_id, uuid) = (object.table_id, object.uuid);
        let existing = self.store.get(table_id, uuid).await?;

        match local_transition(uuid, existing.as_ref().map(|e| e.upload_status), kind)? {
            Transition::Missing => Err(StoreError::NotFound { table_id, uuid }),
            Transition::Drop => {
                self.store.delete(table_id, uuid).await?;
                self.store.delete_file(uuid).await?;
                Ok(MutationOutcome::Removed)
            }
            Transition::Keep(status) => Ok(MutationOutcome::Stored(status)),
            Transition::Store(status) => {
                if let (Some(existing), MutationKind::Delete | MutationKind::Remove) =
                    (existing.as_ref(), kind)
                {
                    // Deletes keep the stored body, not whatever the caller passed
                    object = existing.clone();
                }
                object.etag = existing.and_then(|e| e.etag);
                object.upload_status = status;
                self.store.put(object).await?;
                Ok(MutationOutcome::Stored(status))
            }
        }
    }

    /// Lazily enumerate objects waiting for a push
    ///
    /// Each object is re-read when the stream reaches it, so objects that stopped
    /// needing an upload in the meantime are skipped. Calling this again restarts
    /// the enumeration.
    pub fn entities_pending_upload(
        &self,
        table_id: Option<TableId>,
    ) -> BoxStream<'_, StoreResult<TableObject>> {
        stream::unfold(Cursor::Start, move |mut cursor| async move {
            loop {
                match cursor {
                    Cursor::Start => match self.store.list_pending(table_id).await {
                        Ok(objects) => {
                            cursor = Cursor::Keys(
                                objects.into_iter().map(|o| (o.table_id, o.uuid)).collect(),
                            );
                        }
                        Err(e) => return Some((Err(e), Cursor::Done)),
                    },
                    Cursor::Keys(mut keys) => {
                        let (table_id, uuid) = keys.pop_front()?;
                        match self.store.get(table_id, uuid).await {
                            Ok(Some(object)) if object.upload_status.needs_upload() => {
                                return Some((Ok(object), Cursor::Keys(keys)));
                            }
                            Ok(_) => cursor = Cursor::Keys(keys),
                            Err(e) => return Some((Err(e), Cursor::Keys(keys))),
                        }
                    }
                    Cursor::Done => return None,
                }
            }
        })
        .boxed()
    }

    /// Record a confirmed create or update push
    ///
    /// `pushed` is the body that was sent. If the object was edited while the
    /// push was in flight it stays `Updated`; if it was deleted locally it is
    /// kept as `Deleted` so the next push removes it from the server.
    pub async fn mark_synchronized(
        &self,
        pushed: &TableObject,
        etag: Option<String>,
    ) -> StoreResult<UploadStatus> {
        let _guard = self.write_lock.lock().await;
        let current = self.store.get(pushed.table_id, pushed.uuid).await?;

        let mut object = match current {
            Some(current) => current,
            None => pushed.clone().with_status(UploadStatus::Deleted),
        };
        object.upload_status = confirmed_status(object.upload_status, object.same_content(pushed));
        object.etag = etag;

        let status = object.upload_status;
        if status != UploadStatus::UpToDate {
            debug!(
                "[UploadLedger] {} changed during push, now {:?}",
                object.uuid, status
            );
        }
        self.store.put(object).await?;
        Ok(status)
    }

    /// Remove an object and its ledger record
    pub async fn mark_deleted(
        &self,
        table_id: TableId,
        uuid: Uuid,
    ) -> StoreResult<Option<TableObject>> {
        let _guard = self.write_lock.lock().await;
        self.store.delete_file(uuid).await?;
        self.store.delete(table_id, uuid).await
    }

    /// Local content of a file object, if any
    pub async fn file(&self, uuid: Uuid) -> StoreResult<Option<FilePayload>> {
        self.store.get_file(uuid).await
    }

    pub async fn notification(&self, uuid: Uuid) -> StoreResult<Option<Notification>> {
        self.store.get_notification(uuid).await
    }

    /// Upload status of a tracked notification; `NotificationNotFound` once removed
    pub async fn notification_status(&self, uuid: Uuid) -> StoreResult<UploadStatus> {
        self.store
            .get_notification(uuid)
            .await?
            .map(|n| n.upload_status)
            .ok_or(StoreError::NotificationNotFound(uuid))
    }

    /// Record a local create, update or delete of a notification
    ///
    /// Notifications follow the same transitions as table objects. They cannot
    /// be shared, so `MutationKind::Remove` is rejected.
    pub async fn record_notification_mutation(
        &self,
        mut notification: Notification,
        kind: MutationKind,
    ) -> StoreResult<MutationOutcome> {
        let uuid = notification.uuid;
        if kind == MutationKind::Remove {
            return Err(StoreError::InvalidTransition {
                uuid,
                from: notification.upload_status,
                action: "remove",
            });
        }

        let _guard = self.write_lock.lock().await;
        let existing = self.store.get_notification(uuid).await?;
        match local_transition(uuid, existing.as_ref().map(|n| n.upload_status), kind)? {
            Transition::Missing => Err(StoreError::NotificationNotFound(uuid)),
            Transition::Drop => {
                self.store.delete_notification(uuid).await?;
                Ok(MutationOutcome::Removed)
            }
            Transition::Keep(status) => Ok(MutationOutcome::Stored(status)),
            Transition::Store(status) => {
                if let (Some(existing), MutationKind::Delete) = (existing, kind) {
                    notification = existing;
                }
                notification.upload_status = status;
                self.store.put_notification(notification).await?;
                Ok(MutationOutcome::Stored(status))
            }
        }
    }

    /// Notifications waiting for a push, in storage order
    pub async fn notifications_pending_upload(&self) -> StoreResult<Vec<Notification>> {
        Ok(self
            .store
            .list_notifications()
            .await?
            .into_iter()
            .filter(|n| n.upload_status.needs_upload())
            .collect())
    }

    /// Record a confirmed create or update push of a notification
    pub async fn mark_notification_synchronized(
        &self,
        pushed: &Notification,
    ) -> StoreResult<UploadStatus> {
        let _guard = self.write_lock.lock().await;
        let mut notification = match self.store.get_notification(pushed.uuid).await? {
            Some(current) => current,
            None => pushed.clone().with_status(UploadStatus::Deleted),
        };
        notification.upload_status =
            confirmed_status(notification.upload_status, notification.same_content(pushed));
        let status = notification.upload_status;
        self.store.put_notification(notification).await?;
        Ok(status)
    }

    pub async fn mark_notification_deleted(&self, uuid: Uuid) -> StoreResult<Option<Notification>> {
        let _guard = self.write_lock.lock().await;
        self.store.delete_notification(uuid).await
    }

    /// Reconcile one object pulled from the server
    pub async fn apply_remote(&self, mut remote: TableObject) -> StoreResult<ApplyOutcome> {
        let _guard = self.write_lock.lock().await;
        let current = self.store.get(remote.table_id, remote.uuid).await?;

        let outcome = match current {
            None => {
                remote.upload_status = UploadStatus::UpToDate;
                self.store.put(remote.clone()).await?;
                ApplyOutcome::Inserted(remote)
            }
            Some(current) if current.upload_status.needs_upload() => ApplyOutcome::SkippedPending,
            Some(current) if current.etag == remote.etag && current.same_content(&remote) => {
                ApplyOutcome::Unchanged
            }
            Some(current) => {
                remote.upload_status = match current.upload_status {
                    UploadStatus::NoUpload => UploadStatus::NoUpload,
                    _ => UploadStatus::UpToDate,
                };
                self.store.put(remote.clone()).await?;
                ApplyOutcome::Updated(remote)
            }
        };
        Ok(outcome)
    }

    /// Remove an object the server reported as gone, unless a local edit is pending
    pub async fn remove_remote_deleted(
        &self,
        table_id: TableId,
        uuid: Uuid,
    ) -> StoreResult<Option<TableObject>> {
        let _guard = self.write_lock.lock().await;
        match self.store.get(table_id, uuid).await? {
            Some(object) if !object.upload_status.needs_upload() => {
                self.store.delete_file(uuid).await?;
                self.store.delete(table_id, uuid).await
            }
            _ => Ok(None),
        }
    }

    /// Remove settled objects of a table that the server no longer lists
    pub async fn remove_unlisted(
        &self,
        table_id: TableId,
        listed: &HashSet<Uuid>,
    ) -> StoreResult<Vec<TableObject>> {
        let _guard = self.write_lock.lock().await;
        let mut removed = Vec::new();
        for object in self.store.list_collection(table_id).await? {
            if listed.contains(&object.uuid) || object.upload_status.needs_upload() {
                continue;
            }
            self.store.delete_file(object.uuid).await?;
            if let Some(object) = self.store.delete(table_id, object.uuid).await? {
                removed.push(object);
            }
        }
        Ok(removed)
    }
}

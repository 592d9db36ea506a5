use dav_api::{ApiError, Notification, TableObject, UploadStatus};
use futures::StreamExt;
use tracing::{debug, warn};

use super::{Flow, SyncOrchestrator};
use crate::error::SyncError;
use crate::sync::report::{PushFailure, PushStats, SyncReport};

impl SyncOrchestrator {
    /// Send every pending object, then every pending notification
    ///
    /// One entity's failure never stops the others. Confirmed pushes are always
    /// recorded, so a cancelled pass never leaves an entity that the server
    /// already accepted marked as pending.
    pub(super) async fn push_phase(&self, pass: u64, report: &mut SyncReport) -> Flow {
        let mut pending = self.ledger.entities_pending_upload(None);
        while let Some(next) = pending.next().await {
            if self.is_cancelled(pass) {
                return Flow::Cancelled;
            }
            let object = match next {
                Ok(object) => object,
                Err(e) => {
                    warn!("[SyncOrchestrator] cannot enumerate pending objects: {}", e);
                    report.push_error = Some(e.into());
                    break;
                }
            };

            if let Err(error) = self.push_object(&object, &mut report.pushed).await {
                warn!(
                    "[SyncOrchestrator] push of {}/{} ({:?}) failed: {}",
                    object.table_id, object.uuid, object.upload_status, error
                );
                report.push_failures.push(PushFailure {
                    table_id: Some(object.table_id),
                    uuid: object.uuid,
                    status: object.upload_status,
                    error,
                });
            }
        }
        drop(pending);
        if self.is_cancelled(pass) {
            return Flow::Cancelled;
        }

        if self.notifications.is_some() {
            let flow = self.push_notifications(pass, report).await;
            if flow == Flow::Cancelled || self.is_cancelled(pass) {
                return Flow::Cancelled;
            }
        }
        Flow::Continue
    }

    async fn push_object(
        &self,
        object: &TableObject,
        stats: &mut PushStats,
    ) -> Result<(), SyncError> {
        match object.upload_status {
            UploadStatus::New => {
                let created = self
                    .guard
                    .call(None, |credential| async move {
                        self.remote.create_table_object(&credential, object).await
                    })
                    .await?;
                let etag = self.upload_file(object, created.etag, stats).await?;
                self.ledger.mark_synchronized(object, etag).await?;
                stats.created += 1;
            }
            UploadStatus::Updated => {
                let result = self
                    .guard
                    .call(None, |credential| async move {
                        self.remote.update_table_object(&credential, object).await
                    })
                    .await;
                match result {
                    Ok(updated) => {
                        let etag = self.upload_file(object, updated.etag, stats).await?;
                        self.ledger.mark_synchronized(object, etag).await?;
                        stats.updated += 1;
                    }
                    Err(ApiError::NotFound(_)) => {
                        debug!(
                            "[SyncOrchestrator] {} no longer exists on the server",
                            object.uuid
                        );
                        if let Some(removed) =
                            self.ledger.mark_deleted(object.table_id, object.uuid).await?
                        {
                            self.callbacks.on_entity_deleted(&removed);
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            UploadStatus::Deleted => {
                let uuid = object.uuid;
                let result = self
                    .guard
                    .call(None, |credential| async move {
                        self.remote.delete_table_object(&credential, uuid).await
                    })
                    .await;
                match result {
                    Ok(()) | Err(ApiError::NotFound(_)) => {
                        self.ledger.mark_deleted(object.table_id, uuid).await?;
                        stats.deleted += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            UploadStatus::Removed => {
                let uuid = object.uuid;
                let result = self
                    .guard
                    .call(None, |credential| async move {
                        self.remote.remove_table_object(&credential, uuid).await
                    })
                    .await;
                match result {
                    Ok(()) | Err(ApiError::NotFound(_)) => {
                        self.ledger.mark_deleted(object.table_id, uuid).await?;
                        stats.removed += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            UploadStatus::UpToDate | UploadStatus::NoUpload => {}
        }
        Ok(())
    }

    /// Upload the local content of a file object after its properties went through
    ///
    /// Returns the version tag to record: the one from the file upload when there
    /// was content to send, otherwise `etag` unchanged.
    async fn upload_file(
        &self,
        object: &TableObject,
        etag: Option<String>,
        stats: &mut PushStats,
    ) -> Result<Option<String>, SyncError> {
        if !object.file {
            return Ok(etag);
        }
        let Some(file) = self.ledger.file(object.uuid).await? else {
            debug!(
                "[SyncOrchestrator] {} is a file object without local content",
                object.uuid
            );
            return Ok(etag);
        };

        let uuid = object.uuid;
        let file = &file;
        let uploaded = self
            .guard
            .call(None, |credential| async move {
                self.remote
                    .set_table_object_file(&credential, uuid, file)
                    .await
            })
            .await?;
        stats.files_uploaded += 1;
        Ok(uploaded.etag.or(etag))
    }

    async fn push_notifications(&self, pass: u64, report: &mut SyncReport) -> Flow {
        let pending = match self.ledger.notifications_pending_upload().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(
                    "[SyncOrchestrator] cannot enumerate pending notifications: {}",
                    e
                );
                report.push_error = Some(e.into());
                return Flow::Continue;
            }
        };

        for notification in pending {
            if self.is_cancelled(pass) {
                return Flow::Cancelled;
            }
            if let Err(error) = self
                .push_notification(&notification, &mut report.pushed_notifications)
                .await
            {
                warn!(
                    "[SyncOrchestrator] push of notification {} ({:?}) failed: {}",
                    notification.uuid, notification.upload_status, error
                );
                report.push_failures.push(PushFailure {
                    table_id: None,
                    uuid: notification.uuid,
                    status: notification.upload_status,
                    error,
                });
            }
        }
        Flow::Continue
    }

    async fn push_notification(
        &self,
        notification: &Notification,
        stats: &mut PushStats,
    ) -> Result<(), SyncError> {
        let Some(remote) = self.notifications.as_ref() else {
            return Ok(());
        };

        match notification.upload_status {
            UploadStatus::New => {
                self.guard
                    .call(None, |credential| async move {
                        remote.create_notification(&credential, notification).await
                    })
                    .await?;
                self.ledger
                    .mark_notification_synchronized(notification)
                    .await?;
                stats.created += 1;
            }
            UploadStatus::Updated => {
                let result = self
                    .guard
                    .call(None, |credential| async move {
                        remote.update_notification(&credential, notification).await
                    })
                    .await;
                match result {
                    Ok(()) => {
                        self.ledger
                            .mark_notification_synchronized(notification)
                            .await?;
                        stats.updated += 1;
                    }
                    Err(ApiError::NotFound(_)) => {
                        debug!(
                            "[SyncOrchestrator] notification {} no longer exists on the server",
                            notification.uuid
                        );
                        self.ledger
                            .mark_notification_deleted(notification.uuid)
                            .await?;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            UploadStatus::Deleted => {
                let uuid = notification.uuid;
                let result = self
                    .guard
                    .call(None, |credential| async move {
                        remote.delete_notification(&credential, uuid).await
                    })
                    .await;
                match result {
                    Ok(()) | Err(ApiError::NotFound(_)) => {
                        self.ledger.mark_notification_deleted(uuid).await?;
                        stats.deleted += 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            UploadStatus::Removed | UploadStatus::UpToDate | UploadStatus::NoUpload => {}
        }
        Ok(())
    }
}

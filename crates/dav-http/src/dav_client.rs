//! Client facade wiring configuration, transport, store and sync core together

use dav_api::{
    ApiError, Credentials, FilePayload, LocalStore, Notification, NotificationRemote,
    SessionRenewer, StoreError, TableId, TableObject, TableObjectRemote, Transport,
};
use dav_sync::{
    ConfigError, CredentialGuard, DavConfig, MutationKind, MutationOutcome, PushOnSave, Session,
    SyncCallbacks, SyncOrchestrator, SyncReport, UploadLedger,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::DavApi;
use crate::client::HttpTransport;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct DavClient {
    config: DavConfig,
    session: Arc<Session>,
    orchestrator: Arc<SyncOrchestrator>,
}

impl DavClient {
    /// Connect to the API configured in `config` over HTTP
    pub fn connect(
        config: DavConfig,
        credentials: Credentials,
        store: Arc<dyn LocalStore>,
        callbacks: Arc<dyn SyncCallbacks>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        info!("[DavClient] connecting to {}", transport.base_url());
        Self::with_transport(config, transport, credentials, store, callbacks)
    }

    /// Build a client over any transport
    pub fn with_transport<T: Transport + 'static>(
        config: DavConfig,
        transport: T,
        credentials: Credentials,
        store: Arc<dyn LocalStore>,
        callbacks: Arc<dyn SyncCallbacks>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let api = Arc::new(DavApi::new(transport).with_page_size(config.page_size));
        let renewer: Arc<dyn SessionRenewer> = api.clone();
        let notifications: Arc<dyn NotificationRemote> = api.clone();
        let remote: Arc<dyn TableObjectRemote> = api;

        let session = Arc::new(Session::new(credentials, renewer));
        let ledger = Arc::new(UploadLedger::new(store));
        let orchestrator = SyncOrchestrator::new(
            ledger,
            CredentialGuard::new(session.clone()),
            remote,
            config.table_ids.clone(),
        )
        .with_parallel_tables(config.parallel_table_ids.clone())
        .with_notification_remote(notifications)
        .with_callbacks(callbacks);

        Ok(Self {
            config,
            session,
            orchestrator: Arc::new(orchestrator),
        })
    }

    pub fn config(&self) -> &DavConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    pub async fn get_table_object(
        &self,
        table_id: TableId,
        uuid: Uuid,
    ) -> Result<Option<TableObject>, ClientError> {
        Ok(self.orchestrator.ledger().get(table_id, uuid).await?)
    }

    /// Save a local create or edit, then push according to `push_on_save`
    pub async fn save_table_object(
        &self,
        object: TableObject,
    ) -> Result<MutationOutcome, ClientError> {
        let ledger = self.orchestrator.ledger();
        let kind = match ledger.get(object.table_id, object.uuid).await? {
            Some(_) => MutationKind::Update,
            None => MutationKind::Create,
        };
        let outcome = ledger.record_local_mutation(object, kind).await?;
        self.push_after_save().await;
        Ok(outcome)
    }

    /// Delete locally, then push according to `push_on_save`
    pub async fn delete_table_object(
        &self,
        table_id: TableId,
        uuid: Uuid,
    ) -> Result<MutationOutcome, ClientError> {
        let outcome = self
            .orchestrator
            .ledger()
            .record_local_mutation(TableObject::with_uuid(uuid, table_id), MutationKind::Delete)
            .await?;
        if outcome != MutationOutcome::Removed {
            self.push_after_save().await;
        }
        Ok(outcome)
    }

    /// Store the content of a file object locally, then push according to `push_on_save`
    ///
    /// The object is marked as a file; its content is uploaded right after its
    /// properties on the next push.
    pub async fn save_table_object_file(
        &self,
        object: TableObject,
        file: FilePayload,
    ) -> Result<MutationOutcome, ClientError> {
        let outcome = self.orchestrator.ledger().record_file(object, file).await?;
        self.push_after_save().await;
        Ok(outcome)
    }

    pub async fn get_table_object_file(&self, uuid: Uuid) -> Result<Option<FilePayload>, ClientError> {
        Ok(self.orchestrator.ledger().file(uuid).await?)
    }

    /// Give up access to an object another user shared, then push according to `push_on_save`
    ///
    /// The owner's copy stays on the server.
    pub async fn remove_table_object(
        &self,
        table_id: TableId,
        uuid: Uuid,
    ) -> Result<MutationOutcome, ClientError> {
        let outcome = self
            .orchestrator
            .ledger()
            .record_local_mutation(TableObject::with_uuid(uuid, table_id), MutationKind::Remove)
            .await?;
        if outcome != MutationOutcome::Removed {
            self.push_after_save().await;
        }
        Ok(outcome)
    }

    pub async fn get_notification(&self, uuid: Uuid) -> Result<Option<Notification>, ClientError> {
        Ok(self.orchestrator.ledger().notification(uuid).await?)
    }

    /// Save a local create or edit of a notification, then push according to `push_on_save`
    pub async fn save_notification(
        &self,
        notification: Notification,
    ) -> Result<MutationOutcome, ClientError> {
        let ledger = self.orchestrator.ledger();
        let kind = match ledger.notification(notification.uuid).await? {
            Some(_) => MutationKind::Update,
            None => MutationKind::Create,
        };
        let outcome = ledger.record_notification_mutation(notification, kind).await?;
        self.push_after_save().await;
        Ok(outcome)
    }

    pub async fn delete_notification(&self, uuid: Uuid) -> Result<MutationOutcome, ClientError> {
        let ledger = self.orchestrator.ledger();
        let Some(existing) = ledger.notification(uuid).await? else {
            return Err(StoreError::NotificationNotFound(uuid).into());
        };
        let outcome = ledger
            .record_notification_mutation(existing, MutationKind::Delete)
            .await?;
        if outcome != MutationOutcome::Removed {
            self.push_after_save().await;
        }
        Ok(outcome)
    }

    /// Full pass: push, then pull every configured table
    pub async fn sync(&self) -> SyncReport {
        self.orchestrator.sync().await
    }

    /// Push pending local changes only
    pub async fn sync_push(&self) -> SyncReport {
        self.orchestrator.push().await
    }

    async fn push_after_save(&self) {
        match self.config.push_on_save {
            PushOnSave::Disabled => {}
            PushOnSave::Inline => {
                let report = self.orchestrator.push().await;
                if !report.is_success() {
                    warn!(
                        "[DavClient] push after save left {} objects pending",
                        report.push_failures.len()
                    );
                }
            }
            PushOnSave::Background => {
                let orchestrator = self.orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.push().await;
                });
            }
        }
    }
}

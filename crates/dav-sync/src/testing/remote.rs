use async_trait::async_trait;
use dav_api::{
    ApiError, ApiErrorDetail, FilePayload, Notification, NotificationRemote, RemoteObjectRef,
    TableId, TableObject, TableObjectRemote, TablePage, UploadStatus,
};
use std::collections::BTreeMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Create,
    Get,
    Update,
    Delete,
    SetFile,
    Remove,
    GetTablePage,
    CreateNotification,
    UpdateNotification,
    DeleteNotification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub op: RemoteOp,
    pub credential: String,
    pub uuid: Option<Uuid>,
    pub table_id: Option<TableId>,
    pub page: Option<u32>,
}

struct ScriptedFailure {
    op: RemoteOp,
    uuid: Option<Uuid>,
    error: ApiError,
}

struct RemoteState {
    tables: BTreeMap<TableId, Vec<TableObject>>,
    files: BTreeMap<Uuid, FilePayload>,
    notifications: BTreeMap<Uuid, Notification>,
    valid_credential: String,
    next_etag: u64,
    failures: Vec<ScriptedFailure>,
    calls: Vec<RemoteCall>,
}

impl RemoteState {
    fn fresh_etag(&mut self) -> String {
        self.next_etag += 1;
        format!("etag-{}", self.next_etag)
    }

    fn find(&self, uuid: Uuid) -> Option<(TableId, usize)> {
        self.tables.iter().find_map(|(table_id, objects)| {
            objects
                .iter()
                .position(|o| o.uuid == uuid)
                .map(|index| (*table_id, index))
        })
    }

    /// Record the call, then apply scripted failures and the credential check
    fn begin(&mut self, call: RemoteCall) -> Result<(), ApiError> {
        let credential = call.credential.clone();
        let (op, uuid) = (call.op, call.uuid);
        self.calls.push(call);

        if let Some(index) = self
            .failures
            .iter()
            .position(|f| f.op == op && (f.uuid.is_none() || f.uuid == uuid))
        {
            return Err(self.failures.remove(index).error);
        }
        if credential != self.valid_credential {
            return Err(ApiError::AuthorizationExpired);
        }
        Ok(())
    }
}

/// In-memory stand-in for the table-object and notification endpoints
///
/// Objects live in per-table lists in insertion order. Every server-side write
/// to an object assigns a fresh `etag-N` tag. Calls with a credential other than the valid
/// one fail with `AuthorizationExpired`.
pub struct ScriptedRemote {
    state: Mutex<RemoteState>,
    page_size: usize,
}

impl ScriptedRemote {
    pub fn new(valid_credential: &str, page_size: usize) -> Self {
        Self {
            state: Mutex::new(RemoteState {
                tables: BTreeMap::new(),
                files: BTreeMap::new(),
                notifications: BTreeMap::new(),
                valid_credential: valid_credential.to_string(),
                next_etag: 0,
                failures: Vec::new(),
                calls: Vec::new(),
            }),
            page_size: page_size.max(1),
        }
    }

    /// Create or replace an object on the server side, returning the stored copy
    pub fn insert(&self, object: TableObject) -> TableObject {
        let mut state = lock(&self.state);
        let mut stored = object.with_status(UploadStatus::UpToDate);
        stored.etag = Some(state.fresh_etag());
        match state.find(stored.uuid) {
            Some((table_id, index)) if table_id == stored.table_id => {
                if let Some(objects) = state.tables.get_mut(&table_id) {
                    objects[index] = stored.clone();
                }
            }
            _ => state
                .tables
                .entry(stored.table_id)
                .or_default()
                .push(stored.clone()),
        }
        stored
    }

    pub fn remove(&self, uuid: Uuid) -> Option<TableObject> {
        let mut state = lock(&self.state);
        let (table_id, index) = state.find(uuid)?;
        state.tables.get_mut(&table_id).map(|objects| objects.remove(index))
    }

    pub fn object(&self, uuid: Uuid) -> Option<TableObject> {
        let state = lock(&self.state);
        let (table_id, index) = state.find(uuid)?;
        state.tables.get(&table_id).map(|objects| objects[index].clone())
    }

    pub fn objects(&self, table_id: TableId) -> Vec<TableObject> {
        lock(&self.state)
            .tables
            .get(&table_id)
            .cloned()
            .unwrap_or_default()
    }

    /// File content stored for `uuid` by a file upload
    pub fn file(&self, uuid: Uuid) -> Option<FilePayload> {
        lock(&self.state).files.get(&uuid).cloned()
    }

    pub fn insert_notification(&self, notification: Notification) {
        let stored = notification.with_status(UploadStatus::UpToDate);
        lock(&self.state).notifications.insert(stored.uuid, stored);
    }

    pub fn notification(&self, uuid: Uuid) -> Option<Notification> {
        lock(&self.state).notifications.get(&uuid).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.state).notifications.values().cloned().collect()
    }

    pub fn set_valid_credential(&self, credential: &str) {
        lock(&self.state).valid_credential = credential.to_string();
    }

    /// Fail the next `op` call (for `uuid`, if given) with `error`
    pub fn fail_next(&self, op: RemoteOp, uuid: Option<Uuid>, error: ApiError) {
        lock(&self.state)
            .failures
            .push(ScriptedFailure { op, uuid, error });
    }

    /// Shorthand for a server-side validation rejection
    pub fn validation_error(code: i32) -> ApiError {
        ApiError::Validation {
            status: 400,
            errors: vec![ApiErrorDetail {
                code,
                message: String::new(),
            }],
        }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    pub fn calls_of(&self, op: RemoteOp) -> Vec<RemoteCall> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// `(table, page)` of every page request, in call order
    pub fn table_page_requests(&self) -> Vec<(TableId, u32)> {
        self.calls_of(RemoteOp::GetTablePage)
            .into_iter()
            .filter_map(|c| Some((c.table_id?, c.page?)))
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

fn call(op: RemoteOp, credential: &str) -> RemoteCall {
    RemoteCall {
        op,
        credential: credential.to_string(),
        uuid: None,
        table_id: None,
        page: None,
    }
}

#[async_trait]
impl TableObjectRemote for ScriptedRemote {
    async fn create_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(object.uuid),
            table_id: Some(object.table_id),
            ..call(RemoteOp::Create, credential)
        })?;
        if state.find(object.uuid).is_some() {
            return Err(ApiError::Validation {
                status: 409,
                errors: vec![ApiErrorDetail {
                    code: 2704,
                    message: "uuid already in use".to_string(),
                }],
            });
        }

        let mut stored = object.clone().with_status(UploadStatus::UpToDate);
        stored.etag = Some(state.fresh_etag());
        state
            .tables
            .entry(stored.table_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn get_table_object(
        &self,
        credential: &str,
        uuid: Uuid,
    ) -> Result<TableObject, ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(uuid),
            ..call(RemoteOp::Get, credential)
        })?;
        let (table_id, index) = state
            .find(uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        Ok(state.tables[&table_id][index].clone())
    }

    async fn update_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(object.uuid),
            table_id: Some(object.table_id),
            ..call(RemoteOp::Update, credential)
        })?;
        let (table_id, index) = state
            .find(object.uuid)
            .ok_or_else(|| ApiError::NotFound(object.uuid.to_string()))?;
        let etag = state.fresh_etag();
        let stored = state
            .tables
            .get_mut(&table_id)
            .map(|objects| &mut objects[index])
            .ok_or_else(|| ApiError::NotFound(object.uuid.to_string()))?;
        stored.properties = object.properties.clone();
        stored.etag = Some(etag);
        Ok(stored.clone())
    }

    async fn delete_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(uuid),
            ..call(RemoteOp::Delete, credential)
        })?;
        let (table_id, index) = state
            .find(uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        if let Some(objects) = state.tables.get_mut(&table_id) {
            objects.remove(index);
        }
        Ok(())
    }

    async fn set_table_object_file(
        &self,
        credential: &str,
        uuid: Uuid,
        file: &FilePayload,
    ) -> Result<TableObject, ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(uuid),
            ..call(RemoteOp::SetFile, credential)
        })?;
        let (table_id, index) = state
            .find(uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        let etag = state.fresh_etag();
        state.files.insert(uuid, file.clone());
        let stored = state
            .tables
            .get_mut(&table_id)
            .map(|objects| &mut objects[index])
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        stored.file = true;
        stored.etag = Some(etag);
        Ok(stored.clone())
    }

    async fn remove_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(uuid),
            ..call(RemoteOp::Remove, credential)
        })?;
        let (table_id, index) = state
            .find(uuid)
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))?;
        // The caller loses access; the owner's copy is out of view from here on
        if let Some(objects) = state.tables.get_mut(&table_id) {
            objects.remove(index);
        }
        Ok(())
    }

    async fn get_table_page(
        &self,
        credential: &str,
        table_id: TableId,
        page: u32,
    ) -> Result<TablePage, ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            table_id: Some(table_id),
            page: Some(page),
            ..call(RemoteOp::GetTablePage, credential)
        })?;
        let objects = state.tables.get(&table_id).cloned().unwrap_or_default();
        let pages = objects.len().div_ceil(self.page_size) as u32;
        let start = (page.max(1) as usize - 1) * self.page_size;
        let refs = objects
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|o| RemoteObjectRef {
                uuid: o.uuid,
                etag: o.etag.clone().unwrap_or_default(),
            })
            .collect();
        Ok(TablePage {
            table_id,
            pages,
            objects: refs,
        })
    }
}

#[async_trait]
impl NotificationRemote for ScriptedRemote {
    async fn create_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(notification.uuid),
            ..call(RemoteOp::CreateNotification, credential)
        })?;
        if state.notifications.contains_key(&notification.uuid) {
            return Err(ApiError::Validation {
                status: 409,
                errors: vec![ApiErrorDetail {
                    code: 2704,
                    message: "uuid already in use".to_string(),
                }],
            });
        }
        let stored = notification.clone().with_status(UploadStatus::UpToDate);
        state.notifications.insert(stored.uuid, stored);
        Ok(())
    }

    async fn update_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(notification.uuid),
            ..call(RemoteOp::UpdateNotification, credential)
        })?;
        let stored = state
            .notifications
            .get_mut(&notification.uuid)
            .ok_or_else(|| ApiError::NotFound(notification.uuid.to_string()))?;
        *stored = notification.clone().with_status(UploadStatus::UpToDate);
        Ok(())
    }

    async fn delete_notification(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let mut state = lock(&self.state);
        state.begin(RemoteCall {
            uuid: Some(uuid),
            ..call(RemoteOp::DeleteNotification, credential)
        })?;
        state
            .notifications
            .remove(&uuid)
            .map(|_| ())
            .ok_or_else(|| ApiError::NotFound(uuid.to_string()))
    }
}

//! In-memory dav server behind the `Transport` trait
//!
//! FakeDavServer answers the table object, table, notification and session
//! endpoints the way the real API does, so the request shaping in `DavApi` can
//! be exercised without a network:
//! - every write assigns a fresh etag
//! - table pages are `ceil(objects / count)` long, 0 for an empty table
//! - a request with a stale access token gets 401 and error code 1601
//! - responses can be scripted per method and path

use async_trait::async_trait;
use dav_api::{
    ApiError, ApiRequest, ApiResponse, FilePayload, Method, Notification, RequestBody, TableId,
    TableObject, Transport, UploadStatus,
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::api::{error_body, DEFAULT_PAGE_SIZE, SESSION_EXPIRED_CODE};
use crate::models::{
    CreateTableObjectRequest, NotificationRequest, SessionResponse, TableObjectEntry,
    TableObjectResponse, TableResponse, UpdateTableObjectRequest,
};

struct ScriptedResponse {
    method: Method,
    path_fragment: String,
    response: Result<ApiResponse, ApiError>,
}

struct ServerState {
    tables: BTreeMap<TableId, Vec<TableObject>>,
    files: BTreeMap<Uuid, FilePayload>,
    notifications: BTreeMap<Uuid, Notification>,
    access_token: String,
    refresh_token: String,
    token_counter: u64,
    etag_counter: u64,
    scripted: VecDeque<ScriptedResponse>,
    requests: Vec<ApiRequest>,
}

impl ServerState {
    fn next_etag(&mut self) -> String {
        self.etag_counter += 1;
        format!("{:016x}", self.etag_counter)
    }

    fn find(&self, uuid: Uuid) -> Option<(TableId, usize)> {
        self.tables.iter().find_map(|(table_id, objects)| {
            objects
                .iter()
                .position(|o| o.uuid == uuid)
                .map(|index| (*table_id, index))
        })
    }

    fn take_scripted(&mut self, request: &ApiRequest) -> Option<Result<ApiResponse, ApiError>> {
        let index = self.scripted.iter().position(|s| {
            s.method == request.method && request.path.contains(&s.path_fragment)
        })?;
        self.scripted.remove(index).map(|s| s.response)
    }
}

pub struct FakeDavServer {
    state: Mutex<ServerState>,
}

fn ok<B: Serialize>(status: u16, body: &B) -> ApiResponse {
    ApiResponse::new(status, serde_json::to_value(body).unwrap_or_default())
}

fn error(status: u16, code: i32, message: &str) -> ApiResponse {
    ApiResponse::new(status, error_body(code, message))
}

fn object_response(object: &TableObject) -> TableObjectResponse {
    TableObjectResponse {
        uuid: object.uuid,
        table_id: object.table_id,
        file: object.file,
        etag: object.etag.clone(),
        properties: object.properties.clone(),
    }
}

impl FakeDavServer {
    pub fn new(access_token: &str, refresh_token: &str) -> Self {
        Self {
            state: Mutex::new(ServerState {
                tables: BTreeMap::new(),
                files: BTreeMap::new(),
                notifications: BTreeMap::new(),
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                token_counter: 0,
                etag_counter: 0,
                scripted: VecDeque::new(),
                requests: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object as if another device had written it
    pub fn insert(&self, object: TableObject) -> TableObject {
        let mut state = self.lock();
        let mut stored = object;
        stored.etag = Some(state.next_etag());
        stored.upload_status = UploadStatus::UpToDate;
        match state.find(stored.uuid) {
            Some((table_id, index)) => {
                if let Some(objects) = state.tables.get_mut(&table_id) {
                    objects[index] = stored.clone();
                }
            }
            None => state
                .tables
                .entry(stored.table_id)
                .or_default()
                .push(stored.clone()),
        }
        stored
    }

    pub fn remove(&self, uuid: Uuid) -> Option<TableObject> {
        let mut state = self.lock();
        let (table_id, index) = state.find(uuid)?;
        state.tables.get_mut(&table_id).map(|objects| objects.remove(index))
    }

    pub fn object(&self, uuid: Uuid) -> Option<TableObject> {
        let state = self.lock();
        let (table_id, index) = state.find(uuid)?;
        state.tables.get(&table_id).map(|objects| objects[index].clone())
    }

    pub fn objects(&self, table_id: TableId) -> Vec<TableObject> {
        self.lock().tables.get(&table_id).cloned().unwrap_or_default()
    }

    /// Content uploaded for a file object
    pub fn file(&self, uuid: Uuid) -> Option<FilePayload> {
        self.lock().files.get(&uuid).cloned()
    }

    pub fn notification(&self, uuid: Uuid) -> Option<Notification> {
        self.lock().notifications.get(&uuid).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.values().cloned().collect()
    }

    /// Invalidate the current access token; only a renewal yields a working one
    pub fn expire_session(&self) {
        let mut state = self.lock();
        state.token_counter += 1;
        state.access_token = format!("access-{}", state.token_counter);
    }

    pub fn access_token(&self) -> String {
        self.lock().access_token.clone()
    }

    /// Answer the next matching request with `status` and `body` instead of handling it
    pub fn respond_next(
        &self,
        method: Method,
        path_fragment: &str,
        status: u16,
        body: serde_json::Value,
    ) {
        self.lock().scripted.push_back(ScriptedResponse {
            method,
            path_fragment: path_fragment.to_string(),
            response: Ok(ApiResponse::new(status, body)),
        });
    }

    /// Fail the next matching request as if the network dropped it
    pub fn drop_next(&self, method: Method, path_fragment: &str) {
        self.lock().scripted.push_back(ScriptedResponse {
            method,
            path_fragment: path_fragment.to_string(),
            response: Err(ApiError::Network("connection reset by peer".to_string())),
        });
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn handle(state: &mut ServerState, request: &ApiRequest) -> ApiResponse {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();

        if let (Method::Put, ["session", "renew"]) = (request.method, segments.as_slice()) {
            if request.credential.as_deref() != Some(state.refresh_token.as_str()) {
                return error(403, 1103, "Refresh token is invalid");
            }
            state.token_counter += 1;
            state.access_token = format!("access-{}", state.token_counter);
            return ok(
                200,
                &SessionResponse {
                    access_token: state.access_token.clone(),
                    refresh_token: None,
                },
            );
        }

        if request.credential.as_deref() != Some(state.access_token.as_str()) {
            return error(401, SESSION_EXPIRED_CODE, "Session has expired");
        }

        match (request.method, segments.as_slice()) {
            (Method::Post, ["table_object"]) => Self::create(state, request),
            (Method::Get, ["table_object", uuid]) => match Self::lookup(state, uuid) {
                Some((table_id, index)) => ok(200, &object_response(&state.tables[&table_id][index])),
                None => error(404, 2805, "Table object does not exist"),
            },
            (Method::Put, ["table_object", uuid]) => Self::update(state, request, uuid),
            (Method::Delete, ["table_object", uuid]) => match Self::lookup(state, uuid) {
                Some((table_id, index)) => {
                    if let Some(objects) = state.tables.get_mut(&table_id) {
                        objects.remove(index);
                    }
                    ApiResponse::new(204, serde_json::Value::Null)
                }
                None => error(404, 2805, "Table object does not exist"),
            },
            (Method::Put, ["table_object", uuid, "file"]) => Self::set_file(state, request, uuid),
            (Method::Delete, ["table_object", uuid, "access"]) => {
                match Self::lookup(state, uuid) {
                    Some((table_id, index)) => {
                        // Access is revoked for this user only; the object leaves their view
                        if let Some(objects) = state.tables.get_mut(&table_id) {
                            objects.remove(index);
                        }
                        ApiResponse::new(204, serde_json::Value::Null)
                    }
                    None => error(404, 2805, "Table object does not exist"),
                }
            }
            (Method::Post, ["notification"]) => Self::save_notification(state, request, None),
            (Method::Put, ["notification", uuid]) => {
                Self::save_notification(state, request, Some(*uuid))
            }
            (Method::Delete, ["notification", uuid]) => {
                let removed = Uuid::parse_str(uuid)
                    .ok()
                    .and_then(|uuid| state.notifications.remove(&uuid));
                match removed {
                    Some(_) => ApiResponse::new(204, serde_json::Value::Null),
                    None => error(404, 2812, "Notification does not exist"),
                }
            }
            (Method::Get, ["table", table_id]) => match table_id.parse::<TableId>() {
                Ok(table_id) => Self::table_page(state, request, table_id),
                Err(_) => error(400, 2202, "Invalid table id"),
            },
            _ => error(404, 1000, "Unknown endpoint"),
        }
    }

    fn lookup(state: &ServerState, uuid: &str) -> Option<(TableId, usize)> {
        state.find(Uuid::parse_str(uuid).ok()?)
    }

    fn create(state: &mut ServerState, request: &ApiRequest) -> ApiResponse {
        let Some(body) = request.json_body().cloned() else {
            return error(400, 2101, "Missing request body");
        };
        let Ok(create) = serde_json::from_value::<CreateTableObjectRequest>(body) else {
            return error(400, 2102, "Invalid request body");
        };
        if state.find(create.uuid).is_some() {
            return error(409, 2704, "Uuid already in use");
        }

        let mut object = TableObject::with_uuid(create.uuid, create.table_id);
        object.file = create.file;
        object.properties = create.properties;
        object.etag = Some(state.next_etag());
        object.upload_status = UploadStatus::UpToDate;
        let response = object_response(&object);
        state.tables.entry(object.table_id).or_default().push(object);
        ok(201, &response)
    }

    fn update(state: &mut ServerState, request: &ApiRequest, uuid: &str) -> ApiResponse {
        let Some((table_id, index)) = Self::lookup(state, uuid) else {
            return error(404, 2805, "Table object does not exist");
        };
        let Some(Ok(update)) = request
            .json_body()
            .cloned()
            .map(serde_json::from_value::<UpdateTableObjectRequest>)
        else {
            return error(400, 2102, "Invalid request body");
        };

        let etag = state.next_etag();
        let Some(object) = state
            .tables
            .get_mut(&table_id)
            .and_then(|objects| objects.get_mut(index))
        else {
            return error(404, 2805, "Table object does not exist");
        };
        object.properties = update.properties;
        object.etag = Some(etag);
        ok(200, &object_response(object))
    }

    fn set_file(state: &mut ServerState, request: &ApiRequest, uuid: &str) -> ApiResponse {
        let Some((table_id, index)) = Self::lookup(state, uuid) else {
            return error(404, 2805, "Table object does not exist");
        };
        let Some(RequestBody::Binary { content_type, data }) = request.body.clone() else {
            return error(400, 2103, "Content-Type not supported");
        };

        let etag = state.next_etag();
        let Some(object) = state
            .tables
            .get_mut(&table_id)
            .and_then(|objects| objects.get_mut(index))
        else {
            return error(404, 2805, "Table object does not exist");
        };
        object.file = true;
        object.etag = Some(etag);
        let response = object_response(object);
        state
            .files
            .insert(response.uuid, FilePayload::new(content_type, data));
        ok(200, &response)
    }

    /// Create (`existing` is `None`) or replace a notification
    fn save_notification(
        state: &mut ServerState,
        request: &ApiRequest,
        existing: Option<&str>,
    ) -> ApiResponse {
        let Some(Ok(body)) = request
            .json_body()
            .cloned()
            .map(serde_json::from_value::<NotificationRequest>)
        else {
            return error(400, 2102, "Invalid request body");
        };

        let uuid = match existing {
            Some(path_uuid) => match Uuid::parse_str(path_uuid) {
                Ok(uuid) if state.notifications.contains_key(&uuid) => uuid,
                _ => return error(404, 2812, "Notification does not exist"),
            },
            None if state.notifications.contains_key(&body.uuid) => {
                return error(409, 2704, "Uuid already in use");
            }
            None => body.uuid,
        };

        let notification =
            Notification::with_uuid(uuid, body.time, body.interval, body.title, body.body)
                .with_status(UploadStatus::UpToDate);
        let status = if existing.is_some() { 200 } else { 201 };
        let response = NotificationRequest::from(&notification);
        state.notifications.insert(uuid, notification);
        ok(status, &response)
    }

    fn table_page(state: &ServerState, request: &ApiRequest, table_id: TableId) -> ApiResponse {
        let count = request
            .query_param("count")
            .and_then(|c| c.parse::<usize>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE as usize);
        let page = request
            .query_param("page")
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);

        let objects = state.tables.get(&table_id).map(Vec::as_slice).unwrap_or(&[]);
        let response = TableResponse {
            id: Some(table_id),
            pages: objects.len().div_ceil(count) as u32,
            table_objects: objects
                .iter()
                .skip((page - 1) * count)
                .take(count)
                .map(|o| TableObjectEntry {
                    uuid: o.uuid,
                    etag: o.etag.clone().unwrap_or_default(),
                })
                .collect(),
        };
        ok(200, &response)
    }
}

#[async_trait]
impl Transport for FakeDavServer {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        if let Some(scripted) = state.take_scripted(&request) {
            debug!("[FakeDavServer] scripted answer for {} {}", request.method, request.path);
            return scripted;
        }
        Ok(Self::handle(&mut state, &request))
    }
}

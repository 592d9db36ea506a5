//! Wire shapes of the dav API
//!
//! Only the fields the sync core needs are modelled; unknown fields are ignored.

use dav_api::{ApiErrorDetail, Notification, TableId, TableObject, UploadStatus, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableObjectRequest {
    pub uuid: Uuid,
    pub table_id: TableId,
    pub file: bool,
    pub properties: BTreeMap<String, Value>,
}

impl From<&TableObject> for CreateTableObjectRequest {
    fn from(object: &TableObject) -> Self {
        Self {
            uuid: object.uuid,
            table_id: object.table_id,
            file: object.file,
            properties: object.properties.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateTableObjectRequest {
    pub properties: BTreeMap<String, Value>,
}

/// A table object as returned by the table object endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableObjectResponse {
    pub uuid: Uuid,
    pub table_id: TableId,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl From<TableObjectResponse> for TableObject {
    fn from(response: TableObjectResponse) -> Self {
        TableObject {
            uuid: response.uuid,
            table_id: response.table_id,
            file: response.file,
            etag: response.etag,
            properties: response.properties,
            upload_status: UploadStatus::UpToDate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableObjectEntry {
    pub uuid: Uuid,
    pub etag: String,
}

/// One page of `GET /table/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableResponse {
    #[serde(default)]
    pub id: Option<TableId>,
    pub pages: u32,
    #[serde(default)]
    pub table_objects: Vec<TableObjectEntry>,
}

/// Body of `POST /notification` and `PUT /notification/{uuid}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub uuid: Uuid,
    pub time: i64,
    pub interval: i64,
    pub title: String,
    pub body: String,
}

impl From<&Notification> for NotificationRequest {
    fn from(notification: &Notification) -> Self {
        Self {
            uuid: notification.uuid,
            time: notification.time,
            interval: notification.interval,
            title: notification.title.clone(),
            body: notification.body.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Error body: `{"errors": [{"code": ..., "message": ...}]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

//! Request shaping for the table object, notification and session endpoints

use async_trait::async_trait;
use dav_api::{
    ApiError, ApiErrorDetail, ApiRequest, ApiResponse, Credentials, FilePayload, Method,
    Notification, NotificationRemote, RemoteObjectRef, SessionRenewer, TableId, TableObject,
    TableObjectRemote, TablePage, Transport,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    CreateTableObjectRequest, ErrorResponse, NotificationRequest, SessionResponse,
    TableObjectResponse, TableResponse, UpdateTableObjectRequest,
};

/// Error code the server uses for an expired session
pub const SESSION_EXPIRED_CODE: i32 = 1601;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Map a response to its JSON body or to the matching `ApiError`
pub fn classify_response(response: ApiResponse) -> Result<serde_json::Value, ApiError> {
    if response.is_success() {
        return Ok(response.body);
    }

    let status = response.status;
    let errors = serde_json::from_value::<ErrorResponse>(response.body.clone())
        .map(|e| e.errors)
        .unwrap_or_default();
    let message = match response.body.as_str() {
        Some(text) => text.to_string(),
        None => errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_default(),
    };

    if status == 401 || errors.iter().any(|e| e.code == SESSION_EXPIRED_CODE) {
        return Err(ApiError::AuthorizationExpired);
    }
    Err(match status {
        403 => ApiError::AuthorizationDenied { status, errors },
        404 => ApiError::NotFound(if message.is_empty() {
            "resource not found".to_string()
        } else {
            message
        }),
        400 | 409 | 422 => ApiError::Validation { status, errors },
        _ => ApiError::Server { status, message },
    })
}

fn decode<R: DeserializeOwned>(body: serde_json::Value) -> Result<R, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn encode<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// The dav endpoints on top of any `Transport`
pub struct DavApi<T: Transport> {
    transport: T,
    page_size: u32,
}

impl<T: Transport> DavApi<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Number of objects requested per table page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, ApiError> {
        let description = format!("{} {}", request.method, request.path);
        let response = self.transport.send(request).await?;
        let status = response.status;
        let body = classify_response(response).inspect_err(|e| {
            debug!("[DavApi] {} failed with {}: {}", description, status, e);
        })?;
        decode(body)
    }

    async fn call_empty(&self, request: ApiRequest) -> Result<(), ApiError> {
        let response = self.transport.send(request).await?;
        classify_response(response).map(|_| ())
    }
}

#[async_trait]
impl<T: Transport> TableObjectRemote for DavApi<T> {
    async fn create_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError> {
        let body = encode(&CreateTableObjectRequest::from(object))?;
        let request = ApiRequest::new(Method::Post, "/table_object")
            .with_credential(credential)
            .with_body(body);
        let created: TableObjectResponse = self.call(request).await?;
        Ok(created.into())
    }

    async fn get_table_object(
        &self,
        credential: &str,
        uuid: Uuid,
    ) -> Result<TableObject, ApiError> {
        let request = ApiRequest::new(Method::Get, format!("/table_object/{}", uuid))
            .with_credential(credential);
        let object: TableObjectResponse = self.call(request).await?;
        Ok(object.into())
    }

    async fn update_table_object(
        &self,
        credential: &str,
        object: &TableObject,
    ) -> Result<TableObject, ApiError> {
        let body = encode(&UpdateTableObjectRequest {
            properties: object.properties.clone(),
        })?;
        let request = ApiRequest::new(Method::Put, format!("/table_object/{}", object.uuid))
            .with_credential(credential)
            .with_body(body);
        let updated: TableObjectResponse = self.call(request).await?;
        Ok(updated.into())
    }

    async fn delete_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let request = ApiRequest::new(Method::Delete, format!("/table_object/{}", uuid))
            .with_credential(credential);
        self.call_empty(request).await
    }

    async fn set_table_object_file(
        &self,
        credential: &str,
        uuid: Uuid,
        file: &FilePayload,
    ) -> Result<TableObject, ApiError> {
        let request = ApiRequest::new(Method::Put, format!("/table_object/{}/file", uuid))
            .with_credential(credential)
            .with_binary(file.content_type.clone(), file.data.clone());
        let updated: TableObjectResponse = self.call(request).await?;
        Ok(updated.into())
    }

    async fn remove_table_object(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let request = ApiRequest::new(Method::Delete, format!("/table_object/{}/access", uuid))
            .with_credential(credential);
        self.call_empty(request).await
    }

    async fn get_table_page(
        &self,
        credential: &str,
        table_id: TableId,
        page: u32,
    ) -> Result<TablePage, ApiError> {
        let request = ApiRequest::new(Method::Get, format!("/table/{}", table_id))
            .with_credential(credential)
            .with_query("count", self.page_size)
            .with_query("page", page);
        let table: TableResponse = self.call(request).await?;
        Ok(TablePage {
            table_id,
            pages: table.pages,
            objects: table
                .table_objects
                .into_iter()
                .map(|entry| RemoteObjectRef {
                    uuid: entry.uuid,
                    etag: entry.etag,
                })
                .collect(),
        })
    }
}

#[async_trait]
impl<T: Transport> NotificationRemote for DavApi<T> {
    async fn create_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError> {
        let body = encode(&NotificationRequest::from(notification))?;
        let request = ApiRequest::new(Method::Post, "/notification")
            .with_credential(credential)
            .with_body(body);
        self.call_empty(request).await
    }

    async fn update_notification(
        &self,
        credential: &str,
        notification: &Notification,
    ) -> Result<(), ApiError> {
        let body = encode(&NotificationRequest::from(notification))?;
        let request = ApiRequest::new(Method::Put, format!("/notification/{}", notification.uuid))
            .with_credential(credential)
            .with_body(body);
        self.call_empty(request).await
    }

    async fn delete_notification(&self, credential: &str, uuid: Uuid) -> Result<(), ApiError> {
        let request = ApiRequest::new(Method::Delete, format!("/notification/{}", uuid))
            .with_credential(credential);
        self.call_empty(request).await
    }
}

#[async_trait]
impl<T: Transport> SessionRenewer for DavApi<T> {
    async fn renew(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        let request = ApiRequest::new(Method::Put, "/session/renew").with_credential(refresh_token);
        let session: SessionResponse = self.call(request).await?;
        Ok(Credentials::new(session.access_token, session.refresh_token))
    }
}

/// An error body in the server's format
pub(crate) fn error_body(code: i32, message: &str) -> serde_json::Value {
    serde_json::to_value(ErrorResponse {
        errors: vec![ApiErrorDetail {
            code,
            message: message.to_string(),
        }],
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeDavServer;
    use dav_api::RequestBody;
    use serde_json::json;
    use std::sync::Arc;

    fn response(status: u16, body: serde_json::Value) -> ApiResponse {
        ApiResponse::new(status, body)
    }

    #[test]
    fn test_success_passes_body_through() {
        let body = json!({"pages": 1});
        assert_eq!(classify_response(response(200, body.clone())), Ok(body));
        assert_eq!(
            classify_response(response(204, serde_json::Value::Null)),
            Ok(serde_json::Value::Null)
        );
    }

    #[test]
    fn test_expired_session_by_status_or_code() {
        assert_eq!(
            classify_response(response(401, serde_json::Value::Null)),
            Err(ApiError::AuthorizationExpired)
        );
        assert_eq!(
            classify_response(response(403, error_body(SESSION_EXPIRED_CODE, "Session expired"))),
            Err(ApiError::AuthorizationExpired)
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_response(response(403, error_body(1102, "Action not allowed"))),
            Err(ApiError::AuthorizationDenied { status: 403, .. })
        ));
        assert_eq!(
            classify_response(response(404, error_body(2805, "Table object does not exist"))),
            Err(ApiError::NotFound("Table object does not exist".to_string()))
        );
        assert_eq!(
            classify_response(response(400, error_body(2201, "Field too short"))),
            Err(ApiError::Validation {
                status: 400,
                errors: vec![ApiErrorDetail {
                    code: 2201,
                    message: "Field too short".to_string()
                }]
            })
        );
        assert_eq!(
            classify_response(response(502, json!("Bad Gateway"))),
            Err(ApiError::Server {
                status: 502,
                message: "Bad Gateway".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_file_upload_is_sent_as_raw_bytes() {
        let server = Arc::new(FakeDavServer::new("access", "refresh"));
        let api = DavApi::new(server.clone());
        let object = server.insert(TableObject::new(5));
        let file = FilePayload::new("image/png", vec![0x89u8, 0x50, 0x4e, 0x47]);

        let updated = api
            .set_table_object_file("access", object.uuid, &file)
            .await
            .unwrap();

        assert!(updated.file);
        assert_ne!(updated.etag, object.etag);
        let request = server.requests().pop().unwrap();
        assert_eq!(request.path, format!("/table_object/{}/file", object.uuid));
        assert!(matches!(
            request.body,
            Some(RequestBody::Binary { ref content_type, ref data })
                if content_type == "image/png" && data.len() == 4
        ));

        api.remove_table_object("access", object.uuid).await.unwrap();
        assert!(server.object(object.uuid).is_none());
        assert!(matches!(
            api.remove_table_object("access", object.uuid).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_notification_endpoints() {
        let server = Arc::new(FakeDavServer::new("access", "refresh"));
        let api = DavApi::new(server.clone());
        let mut notification = Notification::new(1_700_000_000, 300, "Stretch", "Stand up");

        api.create_notification("access", &notification).await.unwrap();
        notification.title = "Stretch again".to_string();
        api.update_notification("access", &notification).await.unwrap();

        assert_eq!(
            server.notification(notification.uuid).map(|n| n.title),
            Some("Stretch again".to_string())
        );
        let sent = server.requests();
        assert_eq!(sent[0].path, "/notification");
        assert_eq!(
            sent[0].json_body().map(|b| b["interval"].clone()),
            Some(json!(300))
        );

        api.delete_notification("access", notification.uuid)
            .await
            .unwrap();
        assert!(matches!(
            api.update_notification("access", &notification).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn test_decode_failure() {
        let result: Result<TableResponse, ApiError> = decode(json!({"pages": "many"}));
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }
}

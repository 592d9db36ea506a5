//! Request/response envelope exchanged with the transport adapter
//!
//! The core never sees HTTP types; a transport turns an `ApiRequest` into a
//! response status plus JSON body, or fails with `ApiError::Network`.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Request payload: a JSON document or raw bytes with their content type
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Binary { content_type: String, data: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base url, starting with `/`
    pub path: String,
    /// Value of the Authorization header, if any
    pub credential: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            credential: None,
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn with_binary(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Binary {
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// The body, if it is JSON
    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            Some(RequestBody::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `Null` for empty bodies
    pub body: serde_json::Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests to the remote API
///
/// Implementations return `Err` only when no response was received at all
/// (`ApiError::Network`); every HTTP status, including errors, comes back as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder_collects_query() {
        let request = ApiRequest::new(Method::Get, "/table/12")
            .with_credential("jwt")
            .with_query("count", 50)
            .with_query("page", 2);
        assert_eq!(request.query_param("page"), Some("2"));
        assert_eq!(request.query_param("count"), Some("50"));
        assert_eq!(request.query_param("missing"), None);
        assert_eq!(request.credential.as_deref(), Some("jwt"));
        assert!(request.json_body().is_none());
    }

    #[test]
    fn test_binary_body_is_not_json() {
        let request = ApiRequest::new(Method::Put, "/table_object/x/file")
            .with_binary("image/png", vec![0x89, 0x50]);
        assert!(request.json_body().is_none());
        assert!(matches!(
            request.body,
            Some(RequestBody::Binary { ref content_type, .. }) if content_type == "image/png"
        ));
    }

    #[test]
    fn test_success_range() {
        assert!(ApiResponse::new(201, serde_json::Value::Null).is_success());
        assert!(!ApiResponse::new(401, serde_json::Value::Null).is_success());
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::entity::{TableId, UploadStatus};

/// A single error entry as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

fn describe(errors: &[ApiErrorDetail]) -> String {
    if errors.is_empty() {
        return "no details".to_string();
    }
    errors
        .iter()
        .map(|e| {
            if e.message.is_empty() {
                e.code.to_string()
            } else {
                format!("{} ({})", e.code, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of a remote call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The session credential is invalid or expired; recoverable once via renewal
    #[error("authorization expired")]
    AuthorizationExpired,

    #[error("authorization denied (status {status}): {}", describe(.errors))]
    AuthorizationDenied {
        status: u16,
        errors: Vec<ApiErrorDetail>,
    },

    /// The server rejected the payload
    #[error("validation failed (status {status}): {}", describe(.errors))]
    Validation {
        status: u16,
        errors: Vec<ApiErrorDetail>,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Transient failures leave the entity pending for the next pass
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Server { .. })
    }

    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            ApiError::AuthorizationExpired | ApiError::AuthorizationDenied { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Failure of the local store or of a ledger transition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("table object not found: {table_id}/{uuid}")]
    NotFound { table_id: TableId, uuid: Uuid },

    #[error("notification not found: {0}")]
    NotificationNotFound(Uuid),

    #[error("cannot {action} table object {uuid} while it is {from:?}")]
    InvalidTransition {
        uuid: Uuid,
        from: UploadStatus,
        action: &'static str,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

//! Scheduled notifications synced alongside table objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::UploadStatus;

/// A reminder the server delivers at `time` and then every `interval` seconds
///
/// Notifications carry no version tag; the server copy is whatever was pushed last.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub uuid: Uuid,
    /// Unix timestamp (seconds) of the first delivery
    pub time: i64,
    /// Seconds between deliveries; 0 for a one-off notification
    pub interval: i64,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub upload_status: UploadStatus,
}

impl Notification {
    pub fn new(time: i64, interval: i64, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::with_uuid(Uuid::new_v4(), time, interval, title, body)
    }

    pub fn with_uuid(
        uuid: Uuid,
        time: i64,
        interval: i64,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            uuid,
            time,
            interval,
            title: title.into(),
            body: body.into(),
            upload_status: UploadStatus::New,
        }
    }

    pub fn with_status(mut self, status: UploadStatus) -> Self {
        self.upload_status = status;
        self
    }

    /// Whether everything except the upload status matches `other`
    pub fn same_content(&self, other: &Notification) -> bool {
        self.time == other.time
            && self.interval == other.interval
            && self.title == other.title
            && self.body == other.body
    }
}

//! Table objects and their upload status

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::value::Value;

/// Identifier of a remote table (collection)
pub type TableId = i32;

/// Local mutation-tracking state of a table object relative to the server
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Created locally, never sent to the server
    #[default]
    New,
    /// Exists on the server, carries local changes not yet sent
    Updated,
    /// Marked for deletion locally, not yet confirmed by the server
    Deleted,
    /// Matches the server state as of the last reconciliation
    UpToDate,
    /// Tracked locally but never pushed
    NoUpload,
    /// Access to an object owned by someone else is being given up; not yet
    /// confirmed by the server
    Removed,
}

impl UploadStatus {
    /// Whether the object takes part in the next push phase
    pub fn needs_upload(self) -> bool {
        matches!(
            self,
            UploadStatus::New
                | UploadStatus::Updated
                | UploadStatus::Deleted
                | UploadStatus::Removed
        )
    }
}

/// Content of a file table object
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePayload {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FilePayload {
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A versioned record in a remote table
///
/// `etag` is the server-assigned version tag. It is only authoritative while
/// `upload_status` is `UpToDate`; in every other state the local copy is provisional.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableObject {
    pub uuid: Uuid,
    pub table_id: TableId,
    #[serde(default)]
    pub file: bool,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub upload_status: UploadStatus,
}

impl TableObject {
    /// Create a new local object with a random uuid
    pub fn new(table_id: TableId) -> Self {
        Self::with_uuid(Uuid::new_v4(), table_id)
    }

    pub fn with_uuid(uuid: Uuid, table_id: TableId) -> Self {
        Self {
            uuid,
            table_id,
            file: false,
            etag: None,
            properties: BTreeMap::new(),
            upload_status: UploadStatus::New,
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn with_status(mut self, status: UploadStatus) -> Self {
        self.upload_status = status;
        self
    }

    pub fn get_property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Whether the body (everything except version tag and status) matches `other`
    pub fn same_content(&self, other: &TableObject) -> bool {
        self.file == other.file && self.properties == other.properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_object_is_new_and_untagged() {
        let object = TableObject::new(52);
        assert_eq!(object.upload_status, UploadStatus::New);
        assert!(object.etag.is_none());
        assert_eq!(object.table_id, 52);
    }

    #[test]
    fn test_only_pending_states_need_upload() {
        assert!(UploadStatus::New.needs_upload());
        assert!(UploadStatus::Updated.needs_upload());
        assert!(UploadStatus::Deleted.needs_upload());
        assert!(UploadStatus::Removed.needs_upload());
        assert!(!UploadStatus::UpToDate.needs_upload());
        assert!(!UploadStatus::NoUpload.needs_upload());
    }

    #[test]
    fn test_same_content_ignores_tag_and_status() {
        let a = TableObject::new(1).with_property("page1", "Hello World");
        let b = a
            .clone()
            .with_etag("abc")
            .with_status(UploadStatus::UpToDate);
        assert!(a.same_content(&b));

        let c = b.clone().with_property("page2", 523.1);
        assert!(!a.same_content(&c));
    }
}

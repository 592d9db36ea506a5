//! In-memory `LocalStore`
//!
//! Records are kept in `BTreeMap`s ordered by storage key, so listing a table
//! is a range scan over its key prefix.

use async_trait::async_trait;
use dav_api::{
    FilePayload, LocalStore, Notification, StoreError, StoreResult, TableId, TableObject,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::keys::{notification_key, table_object_key, TABLE_OBJECT_KEY_PREFIX};

#[derive(Default, Serialize)]
struct Records {
    objects: BTreeMap<String, TableObject>,
    files: BTreeMap<Uuid, FilePayload>,
    notifications: BTreeMap<String, Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing objects (statuses are taken as given)
    pub fn from_objects(objects: impl IntoIterator<Item = TableObject>) -> StoreResult<Self> {
        let mut records = Records::default();
        for object in objects {
            records
                .objects
                .insert(object_key(object.table_id, object.uuid)?, object);
        }
        Ok(Self {
            records: RwLock::new(records),
        })
    }

    /// Number of stored table objects
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.objects.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        let records = self.read()?;
        Ok(records.objects.is_empty() && records.notifications.is_empty())
    }

    /// Deterministic JSON dump of every stored record, ordered by key
    pub fn snapshot_json(&self) -> StoreResult<String> {
        let records = self.read()?;
        Ok(serde_json::to_string_pretty(&*records)?)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|e| StoreError::Backend(format!("store lock poisoned: {}", e)))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|e| StoreError::Backend(format!("store lock poisoned: {}", e)))
    }

    fn scan(&self, prefix: &str) -> StoreResult<Vec<TableObject>> {
        let records = self.read()?;
        Ok(records
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, object)| object.clone())
            .collect())
    }
}

fn object_key(table_id: TableId, uuid: Uuid) -> StoreResult<String> {
    table_object_key(Some(table_id), Some(uuid))
        .ok_or_else(|| StoreError::Backend(format!("invalid table id {} for {}", table_id, uuid)))
}

fn table_prefix(table_id: Option<TableId>) -> String {
    table_object_key(table_id, None).unwrap_or_else(|| TABLE_OBJECT_KEY_PREFIX.to_string())
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, table_id: TableId, uuid: Uuid) -> StoreResult<Option<TableObject>> {
        let key = object_key(table_id, uuid)?;
        Ok(self.read()?.objects.get(&key).cloned())
    }

    async fn put(&self, object: TableObject) -> StoreResult<()> {
        let key = object_key(object.table_id, object.uuid)?;
        self.write()?.objects.insert(key, object);
        Ok(())
    }

    async fn delete(&self, table_id: TableId, uuid: Uuid) -> StoreResult<Option<TableObject>> {
        let key = object_key(table_id, uuid)?;
        Ok(self.write()?.objects.remove(&key))
    }

    async fn list_pending(&self, table_id: Option<TableId>) -> StoreResult<Vec<TableObject>> {
        Ok(self
            .scan(&table_prefix(table_id))?
            .into_iter()
            .filter(|object| object.upload_status.needs_upload())
            .collect())
    }

    async fn list_collection(&self, table_id: TableId) -> StoreResult<Vec<TableObject>> {
        self.scan(&table_prefix(Some(table_id)))
    }

    async fn get_file(&self, uuid: Uuid) -> StoreResult<Option<FilePayload>> {
        Ok(self.read()?.files.get(&uuid).cloned())
    }

    async fn put_file(&self, uuid: Uuid, file: FilePayload) -> StoreResult<()> {
        self.write()?.files.insert(uuid, file);
        Ok(())
    }

    async fn delete_file(&self, uuid: Uuid) -> StoreResult<Option<FilePayload>> {
        Ok(self.write()?.files.remove(&uuid))
    }

    async fn get_notification(&self, uuid: Uuid) -> StoreResult<Option<Notification>> {
        Ok(self
            .read()?
            .notifications
            .get(&notification_key(Some(uuid)))
            .cloned())
    }

    async fn put_notification(&self, notification: Notification) -> StoreResult<()> {
        let key = notification_key(Some(notification.uuid));
        self.write()?.notifications.insert(key, notification);
        Ok(())
    }

    async fn delete_notification(&self, uuid: Uuid) -> StoreResult<Option<Notification>> {
        Ok(self
            .write()?
            .notifications
            .remove(&notification_key(Some(uuid))))
    }

    async fn list_notifications(&self) -> StoreResult<Vec<Notification>> {
        Ok(self.read()?.notifications.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dav_api::UploadStatus;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        let object = TableObject::new(3).with_property("title", "Groceries");
        let uuid = object.uuid;

        store.put(object.clone()).await.unwrap();
        assert_eq!(store.get(3, uuid).await.unwrap(), Some(object.clone()));
        assert_eq!(store.get(4, uuid).await.unwrap(), None);

        assert_eq!(store.delete(3, uuid).await.unwrap(), Some(object));
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_collection_listing_does_not_leak_across_tables() {
        // "1/" must not match keys of table 12
        let store = MemoryStore::from_objects(vec![
            TableObject::new(1),
            TableObject::new(12),
            TableObject::new(12).with_status(UploadStatus::UpToDate),
        ])
        .unwrap();

        assert_eq!(store.list_collection(1).await.unwrap().len(), 1);
        assert_eq!(store.list_collection(12).await.unwrap().len(), 2);
        assert_eq!(store.list_pending(Some(12)).await.unwrap().len(), 1);
        assert_eq!(store.list_pending(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable() {
        let uuid = Uuid::new_v4();
        let a = MemoryStore::new();
        let b = MemoryStore::new();
        for store in [&a, &b] {
            store
                .put(TableObject::with_uuid(uuid, 2).with_property("n", 1))
                .await
                .unwrap();
        }
        assert_eq!(a.snapshot_json().unwrap(), b.snapshot_json().unwrap());
    }

    #[tokio::test]
    async fn test_files_and_notifications_are_kept_apart_from_objects() {
        let store = MemoryStore::new();
        let object = TableObject::new(4);
        store.put(object.clone()).await.unwrap();
        store
            .put_file(object.uuid, FilePayload::new("text/plain", b"hello".to_vec()))
            .await
            .unwrap();
        let notification = Notification::new(100, 0, "Title", "Body");
        store.put_notification(notification.clone()).await.unwrap();

        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.list_collection(4).await.unwrap().len(), 1);
        assert_eq!(
            store.get_file(object.uuid).await.unwrap().map(|f| f.data),
            Some(b"hello".to_vec())
        );
        assert_eq!(
            store.list_notifications().await.unwrap(),
            vec![notification.clone()]
        );

        assert!(store.delete_notification(notification.uuid).await.unwrap().is_some());
        assert!(store.get_notification(notification.uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_table_id_is_rejected() {
        let store = MemoryStore::new();
        let result = store.put(TableObject::new(0)).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}

//! Storage keys for table objects
//!
//! Keys nest so that a prefix scan lists everything below it:
//! `tableObject:` > `tableObject:{table_id}/` > `tableObject:{table_id}/{uuid}`.
//! Notifications live under `notification:{uuid}`.

use dav_api::TableId;
use uuid::Uuid;

pub const TABLE_OBJECT_KEY_PREFIX: &str = "tableObject:";
pub const NOTIFICATION_KEY_PREFIX: &str = "notification:";

fn is_table_id_set(table_id: TableId) -> bool {
    table_id != 0 && table_id != -1
}

/// Build the key (or key prefix) for a table object
///
/// A table id of `0` or `-1` counts as absent. A uuid without a table is not a
/// valid combination and yields `None`.
pub fn table_object_key(table_id: Option<TableId>, uuid: Option<Uuid>) -> Option<String> {
    let table_id = table_id.filter(|id| is_table_id_set(*id));
    match (table_id, uuid) {
        (None, None) => Some(TABLE_OBJECT_KEY_PREFIX.to_string()),
        (Some(table_id), None) => Some(format!("{}{}/", TABLE_OBJECT_KEY_PREFIX, table_id)),
        (Some(table_id), Some(uuid)) => {
            Some(format!("{}{}/{}", TABLE_OBJECT_KEY_PREFIX, table_id, uuid))
        }
        (None, Some(_)) => None,
    }
}

/// Key of one notification, or the prefix of all of them
pub fn notification_key(uuid: Option<Uuid>) -> String {
    match uuid {
        Some(uuid) => format!("{}{}", NOTIFICATION_KEY_PREFIX, uuid),
        None => NOTIFICATION_KEY_PREFIX.to_string(),
    }
}

/// Split a full object key back into its table id and uuid
pub fn parse_table_object_key(key: &str) -> Option<(TableId, Uuid)> {
    let rest = key.strip_prefix(TABLE_OBJECT_KEY_PREFIX)?;
    let (table_id, uuid) = rest.split_once('/')?;
    let table_id = table_id.parse::<TableId>().ok()?;
    let uuid = Uuid::parse_str(uuid).ok()?;
    Some((table_id, uuid))
}

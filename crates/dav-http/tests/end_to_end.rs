//! DavClient against the in-memory server, through the real request shaping

use dav_api::{
    Credentials, FilePayload, Method, Notification, TableId, TableObject, UploadStatus, Value,
};
use dav_http::{DavClient, FakeDavServer};
use dav_sync::testing::{CallbackEvent, RecordingCallbacks};
use dav_sync::{DavConfig, MemoryStore, MutationOutcome, PushOnSave, SyncError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Setup {
    server: Arc<FakeDavServer>,
    store: Arc<MemoryStore>,
    callbacks: Arc<RecordingCallbacks>,
    client: DavClient,
}

fn setup(tables: Vec<TableId>, parallel: Vec<TableId>, push_on_save: PushOnSave) -> Setup {
    let server = Arc::new(FakeDavServer::new("access", "refresh"));
    let store = Arc::new(MemoryStore::new());
    let callbacks = Arc::new(RecordingCallbacks::new());
    let config = DavConfig::new(1, tables)
        .with_parallel_tables(parallel)
        .with_page_size(2)
        .with_push_on_save(push_on_save);
    let client = DavClient::with_transport(
        config,
        server.clone(),
        Credentials::new("access", Some("refresh".to_string())),
        store.clone(),
        callbacks.clone(),
    )
    .expect("valid configuration");
    Setup {
        server,
        store,
        callbacks,
        client,
    }
}

#[tokio::test]
async fn inline_save_pushes_and_sync_pulls() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Inline);
    let mine = TableObject::new(1).with_property("title", "mine");
    let theirs = s
        .server
        .insert(TableObject::new(1).with_property("title", "theirs"));

    let outcome = s.client.save_table_object(mine.clone()).await?;
    assert_eq!(outcome, MutationOutcome::Stored(UploadStatus::New));

    let pushed = s.server.object(mine.uuid).expect("object created on server");
    let local = s.client.get_table_object(1, mine.uuid).await?.unwrap();
    assert_eq!(local.upload_status, UploadStatus::UpToDate);
    assert_eq!(local.etag, pushed.etag);
    assert_eq!(pushed.get_property("title"), Some(&Value::from("mine")));

    let report = s.client.sync().await;
    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.pulled.inserted, 1);
    let pulled = s.client.get_table_object(1, theirs.uuid).await?.unwrap();
    assert_eq!(pulled.get_property("title"), Some(&Value::from("theirs")));
    assert_eq!(pulled.etag, theirs.etag);
    Ok(())
}

#[tokio::test]
async fn expired_session_renews_through_the_session_endpoint() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Disabled);
    s.server.insert(TableObject::new(1));
    s.server.expire_session();

    let report = s.client.sync().await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.pulled.inserted, 1);
    assert_eq!(
        s.client.session().current_credential().await,
        s.server.access_token()
    );
    let renewals = s
        .server
        .requests()
        .into_iter()
        .filter(|r| r.path == "/session/renew")
        .count();
    assert_eq!(renewals, 1);
    Ok(())
}

#[tokio::test]
async fn rejected_update_stays_pending_while_others_settle() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Disabled);
    let a = TableObject::new(1).with_property("n", 1);
    let b = TableObject::new(1).with_property("n", 2);
    s.client.save_table_object(a.clone()).await?;
    s.client.save_table_object(b.clone()).await?;
    assert!(s.client.sync_push().await.is_success());

    s.client
        .save_table_object(a.clone().with_property("n", 10))
        .await?;
    s.client
        .save_table_object(b.clone().with_property("n", 20))
        .await?;
    s.server.respond_next(
        Method::Put,
        &format!("/table_object/{}", b.uuid),
        400,
        json!({"errors": [{"code": 2201, "message": "Field too short: n"}]}),
    );

    let report = s.client.sync_push().await;

    assert_eq!(report.pushed.updated, 1);
    assert_eq!(report.push_failures.len(), 1);
    assert_eq!(report.push_failures[0].uuid, b.uuid);
    assert!(matches!(
        report.push_failures[0].error,
        SyncError::Api(dav_api::ApiError::Validation { status: 400, .. })
    ));
    let a_local = s.client.get_table_object(1, a.uuid).await?.unwrap();
    let b_local = s.client.get_table_object(1, b.uuid).await?.unwrap();
    assert_eq!(a_local.upload_status, UploadStatus::UpToDate);
    assert_eq!(b_local.upload_status, UploadStatus::Updated);
    Ok(())
}

#[tokio::test]
async fn delete_reaches_the_server() -> anyhow::Result<()> {
    let s = setup(vec![3], vec![], PushOnSave::Inline);
    let object = TableObject::new(3);
    s.client.save_table_object(object.clone()).await?;
    assert!(s.server.object(object.uuid).is_some());

    let outcome = s.client.delete_table_object(3, object.uuid).await?;

    assert_eq!(outcome, MutationOutcome::Stored(UploadStatus::Deleted));
    assert!(s.server.object(object.uuid).is_none());
    assert!(s.client.get_table_object(3, object.uuid).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn unsent_object_is_deleted_without_a_request() -> anyhow::Result<()> {
    let s = setup(vec![3], vec![], PushOnSave::Disabled);
    let object = TableObject::new(3);
    s.client.save_table_object(object.clone()).await?;

    let outcome = s.client.delete_table_object(3, object.uuid).await?;

    assert_eq!(outcome, MutationOutcome::Removed);
    assert!(s.server.requests().is_empty());
    assert!(s.store.is_empty()?);
    Ok(())
}

#[tokio::test]
async fn background_save_pushes_eventually() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Background);
    let object = TableObject::new(1);
    s.client.save_table_object(object.clone()).await?;

    let pushed = tokio::time::timeout(Duration::from_secs(5), async {
        while s.server.object(object.uuid).is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(pushed.is_ok(), "background push never reached the server");
    Ok(())
}

#[tokio::test]
async fn parallel_tables_page_through_the_table_endpoint() -> anyhow::Result<()> {
    let s = setup(vec![1, 2, 3], vec![2, 3], PushOnSave::Disabled);
    for (table_id, count) in [(1, 5), (2, 3), (3, 7)] {
        for _ in 0..count {
            s.server.insert(TableObject::new(table_id));
        }
    }

    let report = s.client.sync().await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.pulled.inserted, 15);
    let pages: Vec<String> = s
        .server
        .requests()
        .into_iter()
        .filter(|r| r.path.starts_with("/table/"))
        .map(|r| format!("{}:{}", r.path, r.query_param("page").unwrap_or("?")))
        .collect();
    // 3, 2 and 4 pages of two objects; pages 1 come from the page-count round
    assert_eq!(
        pages,
        vec![
            "/table/1:1",
            "/table/2:1",
            "/table/3:1",
            "/table/1:2",
            "/table/1:3",
            "/table/2:2",
            "/table/3:2",
            "/table/3:3",
            "/table/3:4",
        ]
    );
    assert!(
        s.server
            .requests()
            .iter()
            .filter(|r| r.path.starts_with("/table/"))
            .all(|r| r.query_param("count") == Some("2"))
    );
    Ok(())
}

#[tokio::test]
async fn dropped_page_request_aborts_the_pull() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Disabled);
    s.server.insert(TableObject::new(1));
    s.server.drop_next(Method::Get, "/table/1");

    let report = s.client.sync().await;

    assert!(matches!(
        report.pull_error,
        Some(SyncError::Api(dav_api::ApiError::Network(_)))
    ));
    assert!(s.store.is_empty()?);
    assert_eq!(
        s.callbacks.events(),
        vec![CallbackEvent::SyncFinished { pass: 1 }]
    );

    let retry = s.client.sync().await;
    assert!(retry.is_success());
    assert_eq!(retry.pulled.inserted, 1);
    Ok(())
}

#[tokio::test]
async fn notifications_follow_save_and_delete() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Inline);
    let mut notification = Notification::new(1_700_000_000, 604_800, "Weekly review", "Fridays");

    let outcome = s.client.save_notification(notification.clone()).await?;
    assert_eq!(outcome, MutationOutcome::Stored(UploadStatus::New));
    assert_eq!(
        s.client
            .get_notification(notification.uuid)
            .await?
            .map(|n| n.upload_status),
        Some(UploadStatus::UpToDate)
    );
    assert!(s.server.notification(notification.uuid).is_some());

    notification.body = "Fridays at four".to_string();
    s.client.save_notification(notification.clone()).await?;
    assert_eq!(
        s.server.notification(notification.uuid).map(|n| n.body),
        Some("Fridays at four".to_string())
    );

    s.client.delete_notification(notification.uuid).await?;
    assert!(s.server.notifications().is_empty());
    assert!(s.client.get_notification(notification.uuid).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn file_object_uploads_its_content() -> anyhow::Result<()> {
    let s = setup(vec![6], vec![], PushOnSave::Disabled);
    let object = TableObject::new(6).with_property("ext", "txt");
    let file = FilePayload::new("text/plain", b"first draft".to_vec());
    s.client
        .save_table_object_file(object.clone(), file.clone())
        .await?;

    let report = s.client.sync().await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.pushed.files_uploaded, 1);
    assert_eq!(s.server.file(object.uuid), Some(file.clone()));
    let local = s.client.get_table_object(6, object.uuid).await?.unwrap();
    assert!(local.file);
    assert_eq!(local.etag, s.server.object(object.uuid).unwrap().etag);
    assert_eq!(s.client.get_table_object_file(object.uuid).await?, Some(file));
    assert_eq!(report.pulled.unchanged, 1);
    Ok(())
}

#[tokio::test]
async fn removing_a_shared_object_revokes_access_only() -> anyhow::Result<()> {
    let s = setup(vec![1], vec![], PushOnSave::Inline);
    let shared = s.server.insert(TableObject::new(1).with_property("from", "alice"));
    assert!(s.client.sync().await.is_success());

    let outcome = s.client.remove_table_object(1, shared.uuid).await?;

    assert_eq!(outcome, MutationOutcome::Stored(UploadStatus::Removed));
    assert!(s.client.get_table_object(1, shared.uuid).await?.is_none());
    let paths: Vec<(Method, String)> = s
        .server
        .requests()
        .into_iter()
        .map(|r| (r.method, r.path))
        .filter(|(method, _)| *method == Method::Delete)
        .collect();
    assert_eq!(
        paths,
        vec![(Method::Delete, format!("/table_object/{}/access", shared.uuid))]
    );
    Ok(())
}

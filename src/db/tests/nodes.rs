use super::*;
use crate::types::{FileStatus, NodeKind};

#[tokio::test]
async fn test_insert_nodes_sets_leaf_status_and_payload() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(
        &db,
        &[folder(task, &[], "Docs"), doc(task, &["Docs"], "Design")],
    )
    .await;
    assert_eq!(ids.len(), 2);

    let container = db.get_node(ids[0]).await.unwrap().unwrap();
    assert_eq!(container.kind, NodeKind::Folder);
    assert!(!container.is_leaf);
    assert!(!container.is_expanded);
    assert_eq!(container.status, None, "containers carry no file status");

    let leaf = db.get_node(ids[1]).await.unwrap().unwrap();
    assert_eq!(leaf.kind, NodeKind::File);
    assert!(leaf.is_leaf);
    assert_eq!(leaf.status, Some(FileStatus::Pending));
    assert_eq!(leaf.virtual_path, vec!["Docs".to_string()]);
    assert_eq!(leaf.payload, doc(task, &["Docs"], "Design").payload);

    db.close().await;
}

#[tokio::test]
async fn test_insert_nodes_ignores_duplicates() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let first = db
        .insert_nodes(&[doc(task, &["A"], "Design")])
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    let second = db
        .insert_nodes(&[doc(task, &["A"], "Design"), doc(task, &["B"], "Design")])
        .await
        .unwrap();
    assert_eq!(second.len(), 1, "only the new (path, name) is inserted");

    assert_eq!(db.count_leaves(task).await.unwrap(), 2);

    // Same key in another task is a different node
    let other = insert_test_task(&db).await;
    let third = db
        .insert_nodes(&[doc(other, &["A"], "Design")])
        .await
        .unwrap();
    assert_eq!(third.len(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_node_exists_matches_path_and_name() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    db.insert_nodes(&[doc(task, &["A", "B"], "Design")])
        .await
        .unwrap();

    let path = vec!["A".to_string(), "B".to_string()];
    assert!(db.node_exists(task, &path, "Design").await.unwrap());
    assert!(!db.node_exists(task, &path, "Other").await.unwrap());
    assert!(!db.node_exists(task, &["A".to_string()], "Design").await.unwrap());

    db.close().await;
}

#[tokio::test]
async fn test_mark_container_expanded_is_sticky() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    db.insert_nodes(&[folder(task, &[], "Docs"), folder(task, &["Docs"], "Sub")])
        .await
        .unwrap();
    assert_eq!(db.count_unexpanded_containers(task).await.unwrap(), 2);

    db.mark_container_expanded(task, &[], "Docs").await.unwrap();

    let remaining = db.get_unexpanded_containers(task).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Sub");

    // Re-inserting the same container must not reset the flag
    db.insert_nodes(&[folder(task, &[], "Docs")]).await.unwrap();
    assert_eq!(db.count_unexpanded_containers(task).await.unwrap(), 1);

    db.close().await;
}

#[tokio::test]
async fn test_pending_leaves_include_interrupted_downloads() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(
        &db,
        &[
            doc(task, &[], "a"),
            doc(task, &[], "b"),
            doc(task, &[], "c"),
            doc(task, &[], "d"),
        ],
    )
    .await;

    db.update_leaf_status(ids[0], FileStatus::Completed, None)
        .await
        .unwrap();
    db.update_leaf_status(ids[1], FileStatus::Downloading, None)
        .await
        .unwrap();

    let pending = db.get_pending_leaves(task, 10).await.unwrap();
    let names: Vec<&str> = pending.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["b", "c", "d"]);

    let limited = db.get_pending_leaves(task, 2).await.unwrap();
    assert_eq!(limited.len(), 2);

    db.close().await;
}

#[tokio::test]
async fn test_count_leaves_by_status_sums_to_total() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(
        &db,
        &[
            folder(task, &[], "Docs"),
            doc(task, &[], "a"),
            doc(task, &[], "b"),
            doc(task, &[], "c"),
        ],
    )
    .await;

    db.update_leaf_status(ids[1], FileStatus::Completed, None)
        .await
        .unwrap();
    db.update_leaf_status(ids[2], FileStatus::Failed, Some("export failed"))
        .await
        .unwrap();

    let counts = db.count_leaves_by_status(task).await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.downloading, 0);
    assert_eq!(counts.total(), db.count_leaves(task).await.unwrap());

    let failed = db.get_node(ids[2]).await.unwrap().unwrap();
    assert_eq!(failed.error.as_deref(), Some("export failed"));

    db.close().await;
}

#[tokio::test]
async fn test_update_leaf_status_ignores_containers() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(&db, &[folder(task, &[], "Docs")]).await;
    db.update_leaf_status(ids[0], FileStatus::Completed, None)
        .await
        .unwrap();

    let node = db.get_node(ids[0]).await.unwrap().unwrap();
    assert_eq!(node.status, None);

    db.close().await;
}

#[tokio::test]
async fn test_reset_failed_leaves_clears_errors() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(&db, &[doc(task, &[], "a"), doc(task, &[], "b")]).await;
    db.update_leaf_status(ids[0], FileStatus::Failed, Some("HTTP 500"))
        .await
        .unwrap();
    db.update_leaf_status(ids[1], FileStatus::Completed, None)
        .await
        .unwrap();

    let reset = db.reset_failed_leaves(task).await.unwrap();
    assert_eq!(reset.len(), 1);
    assert_eq!(reset[0].id, ids[0]);
    assert_eq!(reset[0].status, Some(FileStatus::Pending));

    let node = db.get_node(ids[0]).await.unwrap().unwrap();
    assert_eq!(node.status, Some(FileStatus::Pending));
    assert!(node.error.is_none());

    assert!(db.reset_failed_leaves(task).await.unwrap().is_empty());

    db.close().await;
}

#[tokio::test]
async fn test_reset_interrupted_leaves() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(&db, &[doc(task, &[], "a"), doc(task, &[], "b")]).await;
    db.update_leaf_status(ids[0], FileStatus::Downloading, None)
        .await
        .unwrap();

    assert_eq!(db.reset_interrupted_leaves().await.unwrap(), 1);
    let counts = db.count_leaves_by_status(task).await.unwrap();
    assert_eq!(counts.pending, 2);
    assert_eq!(counts.downloading, 0);

    db.close().await;
}

#[tokio::test]
async fn test_child_path_skips_transparent_drive_root() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(
        &db,
        &[
            NewNode {
                task_id: task,
                parent_id: None,
                name: "My Space".to_string(),
                virtual_path: vec![],
                is_leaf: false,
                payload: NodePayload::DriveRoot {
                    token: "root".to_string(),
                },
            },
            folder(task, &[], "Docs"),
        ],
    )
    .await;

    let root = db.get_node(ids[0]).await.unwrap().unwrap();
    assert!(root.child_path().is_empty());

    let docs = db.get_node(ids[1]).await.unwrap().unwrap();
    assert_eq!(docs.child_path(), vec!["Docs".to_string()]);

    db.close().await;
}

#[tokio::test]
async fn test_set_node_error() {
    let (db, _temp_file) = open_test_db().await;
    let task = insert_test_task(&db).await;

    let ids = insert_ids(&db, &[folder(task, &[], "Docs")]).await;
    db.set_node_error(ids[0], Some("permission denied"))
        .await
        .unwrap();

    let node = db.get_node(ids[0]).await.unwrap().unwrap();
    assert_eq!(node.error.as_deref(), Some("permission denied"));

    db.close().await;
}

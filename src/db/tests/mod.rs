mod nodes;

use crate::db::*;
use crate::provider::NodePayload;
use crate::types::{NodeId, TaskId};
use tempfile::NamedTempFile;

/// Open a fresh database backed by a temp file (keep the file alive)
async fn open_test_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

async fn insert_test_task(db: &Database) -> TaskId {
    db.insert_task(&NewTask {
        name: "Test Export".to_string(),
        description: None,
        output_path: "/exports".to_string(),
        status: 0,
    })
    .await
    .unwrap()
}

fn folder(task_id: TaskId, path: &[&str], name: &str) -> NewNode {
    NewNode {
        task_id,
        parent_id: None,
        name: name.to_string(),
        virtual_path: path.iter().map(|s| s.to_string()).collect(),
        is_leaf: false,
        payload: NodePayload::Folder {
            token: format!("fld-{}", name),
        },
    }
}

fn doc(task_id: TaskId, path: &[&str], name: &str) -> NewNode {
    NewNode {
        task_id,
        parent_id: None,
        name: name.to_string(),
        virtual_path: path.iter().map(|s| s.to_string()).collect(),
        is_leaf: true,
        payload: NodePayload::File {
            token: format!("doc-{}", name),
            file_type: "docx".to_string(),
            shortcut: None,
        },
    }
}

/// Insert nodes and return the IDs of the inserted rows
async fn insert_ids(db: &Database, nodes: &[NewNode]) -> Vec<NodeId> {
    db.insert_nodes(nodes)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.id)
        .collect()
}

//! Mock Feishu open API fixtures built on wiremock

use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Wrap `data` in the `{code, msg, data}` envelope
pub fn envelope(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
}

/// Body written for a directly downloaded file
pub fn file_body(token: &str) -> String {
    format!("bytes of {}", token)
}

/// Body written for an exported document
pub fn export_body(token: &str) -> String {
    format!("exported {}", token)
}

/// Drive listing entry
pub fn drive_file(name: &str, token: &str, file_type: &str) -> Value {
    json!({ "name": name, "token": token, "type": file_type })
}

/// Wiki listing entry backed by an object of `obj_type`
pub fn wiki_node(space_id: &str, title: &str, node_token: &str, obj_type: &str, has_child: bool) -> Value {
    json!({
        "space_id": space_id,
        "node_token": node_token,
        "obj_token": format!("obj-{}", node_token),
        "obj_type": obj_type,
        "title": title,
        "has_child": has_child,
    })
}

/// Serve a single page listing of a drive folder
pub async fn mount_folder(server: &MockServer, folder_token: &str, files: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/drive/v1/files"))
        .and(query_param("folder_token", folder_token))
        .respond_with(envelope(json!({ "files": files, "has_more": false })))
        .mount(server)
        .await;
}

/// Serve the bytes of an uploaded file, optionally after `delay`
pub async fn mount_download(server: &MockServer, token: &str, delay: Option<Duration>) {
    let mut response = ResponseTemplate::new(200).set_body_string(file_body(token));
    if let Some(delay) = delay {
        response = response.set_delay(delay);
    }

    Mock::given(method("GET"))
        .and(path(format!("/drive/v1/files/{}/download", token)))
        .respond_with(response)
        .mount(server)
        .await;
}

/// Fail the next `times` downloads of `token` with `status`
///
/// Mount before [`mount_download`] so the failure takes precedence while it lasts.
pub async fn mount_download_failure(server: &MockServer, token: &str, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v1/files/{}/download", token)))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

/// Serve a complete export job for `token`: creation, one processing poll, done, artifact
pub async fn mount_export(server: &MockServer, token: &str) {
    let ticket = format!("ticket-{}", token);
    let artifact = format!("box-{}", token);

    Mock::given(method("POST"))
        .and(path("/drive/v1/export_tasks"))
        .and(body_partial_json(json!({ "token": token })))
        .respond_with(envelope(json!({ "ticket": ticket })))
        .mount(server)
        .await;

    let poll_path = format!("/drive/v1/export_tasks/{}", ticket);
    Mock::given(method("GET"))
        .and(path(poll_path.clone()))
        .respond_with(envelope(json!({ "result": { "job_status": 2 } })))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(poll_path))
        .respond_with(envelope(json!({
            "result": { "job_status": 0, "file_token": artifact, "file_size": 16 }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drive/v1/export_tasks/file/{}/download", artifact)))
        .respond_with(ResponseTemplate::new(200).set_body_string(export_body(token)))
        .mount(server)
        .await;
}

/// Serve the list of wiki spaces
pub async fn mount_spaces(server: &MockServer, spaces: &[(&str, &str)]) {
    let items: Vec<Value> = spaces
        .iter()
        .map(|(space_id, name)| json!({ "space_id": space_id, "name": name }))
        .collect();

    Mock::given(method("GET"))
        .and(path("/wiki/v2/spaces"))
        .respond_with(envelope(json!({ "items": items, "has_more": false })))
        .mount(server)
        .await;
}

/// Serve the children of a wiki node, or the top level of the space when `parent` is None
pub async fn mount_wiki_children(
    server: &MockServer,
    space_id: &str,
    parent: Option<&str>,
    nodes: Vec<Value>,
) {
    let mock = Mock::given(method("GET")).and(path(format!("/wiki/v2/spaces/{}/nodes", space_id)));
    let mock = match parent {
        Some(parent) => mock.and(query_param("parent_node_token", parent)),
        None => mock.and(query_param_is_missing("parent_node_token")),
    };

    mock.respond_with(envelope(json!({ "items": nodes, "has_more": false })))
        .mount(server)
        .await;
}

/// Number of requests the server received for `request_path`
pub async fn request_count(server: &MockServer, request_path: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == request_path)
        .count()
}

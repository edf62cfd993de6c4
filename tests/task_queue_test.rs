//! End-to-end tests for the task-service backend over HTTP.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use mockito::Matcher;
use serde_json::json;

use fetch_queue::queue::{HttpTaskClient, StaticTokenSource, TaskServiceError};
use fetch_queue::{Options, Queue, QueueError, TaskQueue, TasksConfig};

const QUEUE: &str = "projects/proj/locations/us-central1/queues/fetch";

fn config(endpoint: &str) -> TasksConfig {
    TasksConfig {
        project: "proj".into(),
        location: "us-central1".into(),
        queue_id: "fetch".into(),
        target_url: "https://worker.example.com".into(),
        service_account: "queue@proj.iam.gserviceaccount.com".into(),
        audience: "https://worker.example.com".into(),
        endpoint: endpoint.into(),
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn task_queue(server: &mockito::Server) -> TaskQueue {
    let client = HttpTaskClient::new(
        reqwest::Client::new(),
        &server.url(),
        Arc::new(StaticTokenSource("test-token".into())),
    );
    TaskQueue::new(
        Arc::new(client),
        config(&server.url()),
        Duration::from_secs(3 * 3600),
    )
    .unwrap()
    .with_clock(now)
}

fn created(name: &str) -> String {
    json!({
        "name": name,
        "httpRequest": {"httpMethod": "POST", "url": "https://worker.example.com/fetch/m/@v/v1"},
        "dispatchDeadline": "1800s"
    })
    .to_string()
}

#[tokio::test]
async fn test_create_then_duplicate() {
    let mut server = mockito::Server::new_async().await;
    let q = task_queue(&server);
    let expected = q.build_task("golang.org/x/mod", "v0.5.0", &Options::frontend(), now());

    let create = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::PartialJson(json!({
            "task": {
                "httpRequest": {
                    "httpMethod": "POST",
                    "url": "https://worker.example.com/fetch/golang.org/x/mod/@v/v0.5.0?source=frontend",
                    "oidcToken": {
                        "serviceAccountEmail": "queue@proj.iam.gserviceaccount.com",
                        "audience": "https://worker.example.com"
                    }
                },
                "dispatchDeadline": "1800s"
            }
        })))
        .with_status(200)
        .with_body(created(&expected.name))
        .expect(1)
        .create_async()
        .await;

    let opts = Options::frontend();
    assert!(q
        .schedule_fetch("golang.org/x/mod", "v0.5.0", Some(&opts))
        .await
        .unwrap());
    create.assert_async().await;

    // The service remembers the name; a second call in the window conflicts.
    let mut server = mockito::Server::new_async().await;
    let q = task_queue(&server);
    let conflict = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .with_status(409)
        .with_body(r#"{"error":{"code":409,"message":"Requested entity already exists","status":"ALREADY_EXISTS"}}"#)
        .create_async()
        .await;

    assert!(!q
        .schedule_fetch("golang.org/x/mod", "v0.5.0", Some(&opts))
        .await
        .unwrap());
    conflict.assert_async().await;
}

#[tokio::test]
async fn test_service_error_is_wrapped_with_context() {
    let mut server = mockito::Server::new_async().await;
    let _unavailable = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .with_status(503)
        .with_body(r#"{"error":{"code":503,"message":"backend unavailable","status":"UNAVAILABLE"}}"#)
        .create_async()
        .await;

    let q = task_queue(&server);
    let err = q.schedule_fetch("m", "v1", None).await.unwrap_err();
    match err {
        QueueError::Admission {
            module_path,
            version,
            source: TaskServiceError::Status { code, message },
            ..
        } => {
            assert_eq!(module_path, "m");
            assert_eq!(version, "v1");
            assert_eq!(code, 503);
            assert_eq!(message, "backend unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_suffix_changes_the_task_name() {
    let mut server = mockito::Server::new_async().await;
    let q = task_queue(&server);
    let plain = q.build_task("m", "v1", &Options::default(), now());
    let forced_opts = Options::default().with_suffix("retry");
    let forced = q.build_task("m", "v1", &forced_opts, now());
    assert_ne!(plain.name, forced.name);

    let mock = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .match_body(Matcher::PartialJson(json!({"task": {"name": forced.name}})))
        .with_status(200)
        .with_body(created(&forced.name))
        .create_async()
        .await;

    assert!(q.schedule_fetch("m", "v1", Some(&forced_opts)).await.unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_aborted_conflict_is_an_admission_error() {
    let mut server = mockito::Server::new_async().await;
    let _aborted = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .with_status(409)
        .with_body(r#"{"error":{"code":409,"message":"transaction aborted","status":"ABORTED"}}"#)
        .create_async()
        .await;

    let q = task_queue(&server);
    let err = q.schedule_fetch("m", "v1", None).await.unwrap_err();
    assert!(
        matches!(
            err,
            QueueError::Admission {
                source: TaskServiceError::Status { code: 409, .. },
                ..
            }
        ),
        "unexpected result: {err:?}"
    );
}

#[tokio::test]
async fn test_created_task_with_empty_body_is_admitted() {
    let mut server = mockito::Server::new_async().await;
    let create = server
        .mock("POST", format!("/v2/{QUEUE}/tasks").as_str())
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let q = task_queue(&server);
    assert!(q.schedule_fetch("m", "v1", None).await.unwrap());
    create.assert_async().await;
}

//! Tests for the task-service backend.

use std::collections::HashSet;

use chrono::TimeZone;
use parking_lot::Mutex;

use super::*;
use crate::config::ConfigError;

/// In-memory stand-in for the task service with name-based dedup.
#[derive(Default)]
struct FakeTaskService {
    names: Mutex<HashSet<String>>,
    submitted: Mutex<Vec<(String, Task)>>,
    fail_with: Mutex<Option<TaskServiceError>>,
    hang: bool,
}

#[async_trait]
impl TaskClient for FakeTaskService {
    async fn create_task(&self, parent: &str, task: &Task) -> Result<Task, TaskServiceError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.fail_with.lock().take() {
            return Err(err);
        }
        if !self.names.lock().insert(task.name.clone()) {
            return Err(TaskServiceError::AlreadyExists);
        }
        self.submitted.lock().push((parent.to_string(), task.clone()));
        Ok(task.clone())
    }
}

fn config() -> TasksConfig {
    TasksConfig {
        project: "proj".into(),
        location: "us-central1".into(),
        queue_id: "fetch".into(),
        target_url: "https://worker.example.com/".into(),
        service_account: "queue@proj.iam.gserviceaccount.com".into(),
        audience: "https://worker.example.com".into(),
        ..Default::default()
    }
}

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn queue(service: Arc<FakeTaskService>) -> TaskQueue {
    TaskQueue::new(service, config(), Duration::from_secs(3 * 3600))
        .unwrap()
        .with_clock(fixed_now)
}

#[test]
fn build_task_fills_every_field() {
    let q = queue(Arc::new(FakeTaskService::default()));
    let opts = Options::frontend().without_proxy_fetch();
    let task = q.build_task("golang.org/x/mod", "v0.5.0", &opts, fixed_now());

    let id = derive_task_id("golang.org/x/mod", "v0.5.0", fixed_now(), Duration::from_secs(3 * 3600));
    assert_eq!(
        task.name,
        format!("projects/proj/locations/us-central1/queues/fetch/tasks/{id}")
    );
    assert_eq!(task.http_request.http_method, "POST");
    assert_eq!(
        task.http_request.url,
        "https://worker.example.com/fetch/golang.org/x/mod/@v/v0.5.0?proxyfetch=off&source=frontend"
    );
    let oidc = task.http_request.oidc_token.unwrap();
    assert_eq!(oidc.service_account_email, "queue@proj.iam.gserviceaccount.com");
    assert_eq!(oidc.audience, "https://worker.example.com");
    assert_eq!(task.dispatch_deadline, Duration::from_secs(1800));
}

#[test]
fn suffix_extends_task_name() {
    let q = queue(Arc::new(FakeTaskService::default()));
    let plain = q.build_task("m", "v1", &Options::default(), fixed_now());
    let forced = q.build_task("m", "v1", &Options::default().with_suffix("again"), fixed_now());
    assert_eq!(forced.name, format!("{}-again", plain.name));
}

#[tokio::test]
async fn second_schedule_in_window_is_not_enqueued() {
    let service = Arc::new(FakeTaskService::default());
    let q = queue(service.clone());

    assert!(q.schedule_fetch("m", "v1.0.0", None).await.unwrap());
    assert!(!q.schedule_fetch("m", "v1.0.0", None).await.unwrap());

    let forced = Options::default().with_suffix("1");
    assert!(q.schedule_fetch("m", "v1.0.0", Some(&forced)).await.unwrap());

    let submitted = service.submitted.lock();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].0, "projects/proj/locations/us-central1/queues/fetch");
}

#[tokio::test]
async fn new_bucket_schedules_again() {
    let service = Arc::new(FakeTaskService::default());
    let q = queue(service.clone());
    assert!(q.schedule_fetch("m", "v1.0.0", None).await.unwrap());

    let later = q.with_clock(|| fixed_now() + chrono::Duration::hours(4));
    assert!(later.schedule_fetch("m", "v1.0.0", None).await.unwrap());
}

#[tokio::test]
async fn other_errors_are_wrapped() {
    let service = Arc::new(FakeTaskService::default());
    *service.fail_with.lock() = Some(TaskServiceError::Status {
        code: 503,
        message: "unavailable".into(),
    });
    let q = queue(service);

    let opts = Options::default().with_suffix("x");
    let err = q.schedule_fetch("m", "v1", Some(&opts)).await.unwrap_err();
    match &err {
        QueueError::Admission { module_path, version, suffix, source } => {
            assert_eq!((module_path.as_str(), version.as_str(), suffix.as_str()), ("m", "v1", "x"));
            assert!(matches!(source, TaskServiceError::Status { code: 503, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains("m@v1") && msg.contains("unavailable"), "{msg}");
}

#[tokio::test]
async fn unknown_module_path_is_rejected_without_a_call() {
    let service = Arc::new(FakeTaskService::default());
    let q = queue(service.clone());
    let err = q.schedule_fetch(UNKNOWN_MODULE_PATH, "v1", None).await.unwrap_err();
    assert!(matches!(err, QueueError::UnknownModulePath));
    assert!(service.submitted.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_service_times_out() {
    let service = Arc::new(FakeTaskService {
        hang: true,
        ..Default::default()
    });
    let q = queue(service);
    let err = q.schedule_fetch("m", "v1", None).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::Admission {
            source: TaskServiceError::Timeout(d),
            ..
        } if d == ADMISSION_TIMEOUT
    ));
}

#[test]
fn missing_config_fails_construction() {
    let mut cfg = config();
    cfg.service_account.clear();
    let err = TaskQueue::new(Arc::new(FakeTaskService::default()), cfg, Duration::ZERO).unwrap_err();
    assert!(matches!(err, QueueError::Config(ConfigError::Missing("service_account"))));
}

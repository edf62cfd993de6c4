//! Task-service wire types and client.
//!
//! `Task` mirrors the REST representation used by `tasks.create`. Only the
//! fields the queue sets are modelled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::TaskServiceError;
use super::token::TokenSource;

/// A task as submitted to the task service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// `projects/<p>/locations/<l>/queues/<q>/tasks/<id>`.
    pub name: String,
    pub http_request: HttpRequest,
    #[serde(
        serialize_with = "serialize_secs",
        deserialize_with = "deserialize_secs",
        default
    )]
    pub dispatch_deadline: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub http_method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_token: Option<OidcToken>,
}

/// Identity token the service attaches when dispatching the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcToken {
    pub service_account_email: String,
    pub audience: String,
}

/// Durations travel as `"<seconds>s"`.
fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{}s", d.as_secs()))
}

fn deserialize_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(d)?;
    let secs = raw.trim_end_matches('s');
    let secs: f64 = secs.parse().map_err(serde::de::Error::custom)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid duration {raw:?}")));
    }
    Ok(Duration::from_secs_f64(secs))
}

/// The external task service.
#[async_trait]
pub trait TaskClient: Send + Sync {
    /// Create `task` in the queue `parent`.
    ///
    /// A name collision must be reported as [`TaskServiceError::AlreadyExists`].
    async fn create_task(&self, parent: &str, task: &Task) -> Result<Task, TaskServiceError>;
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    task: &'a Task,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// 409 is shared by `ALREADY_EXISTS` and `ABORTED`; only a bare 409 or an
/// explicit `ALREADY_EXISTS` is a name collision.
fn is_already_exists(code: u16, status: &str) -> bool {
    match status {
        "ALREADY_EXISTS" => true,
        "" => code == 409,
        _ => false,
    }
}

/// REST client for the task service.
pub struct HttpTaskClient {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

impl HttpTaskClient {
    pub fn new(client: reqwest::Client, endpoint: &str, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            tokens,
        }
    }
}

#[async_trait]
impl TaskClient for HttpTaskClient {
    async fn create_task(&self, parent: &str, task: &Task) -> Result<Task, TaskServiceError> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(format!("{}/v2/{parent}/tasks", self.endpoint))
            .bearer_auth(token)
            .json(&CreateTaskRequest { task })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            // The task exists once the service answers 2xx; an odd body must
            // not turn that into an error the caller would retry.
            return match response.json::<Task>().await {
                Ok(created) => Ok(created),
                Err(e) => {
                    tracing::warn!(task = %task.name, error = %e, "created task with undecodable response");
                    Ok(task.clone())
                }
            };
        }

        let code = status.as_u16();
        let body: ErrorBody = response.json().await.unwrap_or_default();
        if is_already_exists(code, &body.error.status) {
            return Err(TaskServiceError::AlreadyExists);
        }
        Err(TaskServiceError::Status {
            code,
            message: body.error.message,
        })
    }
}

//! Bearer tokens for the task-service API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Deserialize;

use super::error::TaskServiceError;

pub const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
/// Refresh this long before the server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of OAuth access tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, TaskServiceError>;
}

/// Fixed token, for emulators and tests.
#[derive(Debug, Clone)]
pub struct StaticTokenSource(pub String);

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String, TaskServiceError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: DateTime<Utc>,
}

/// Default service-account token from the instance metadata server.
///
/// The token is cached until shortly before it expires.
pub struct MetadataTokenSource {
    client: reqwest::Client,
    host: String,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_host(client, DEFAULT_METADATA_HOST)
    }

    pub fn with_host(client: reqwest::Client, host: &str) -> Self {
        Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            cached: Mutex::new(None),
        }
    }

    fn cached_token(&self, now: DateTime<Utc>) -> Option<String> {
        let cached = self.cached.lock();
        cached
            .as_ref()
            .filter(|t| now < t.refresh_at)
            .map(|t| t.value.clone())
    }

    async fn fetch(&self) -> Result<TokenResponse, TaskServiceError> {
        let response = self
            .client
            .get(format!("{}{TOKEN_PATH}", self.host))
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| TaskServiceError::Auth(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TaskServiceError::Auth(format!(
                "metadata server returned status {}",
                response.status()
            )));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| TaskServiceError::Auth(e.to_string()))
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String, TaskServiceError> {
        let now = Utc::now();
        if let Some(token) = self.cached_token(now) {
            return Ok(token);
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        let refresh_at = now
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());
        tracing::debug!(expires_in = fresh.expires_in, "refreshed task-service token");

        *self.cached.lock() = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at,
        });
        Ok(fresh.access_token)
    }
}

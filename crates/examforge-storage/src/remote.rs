//! Remote key/value storage service backend.
//!
//! Protocol: `PUT {base}/v1/storage/{key}` with body `{"value": ...}`,
//! `GET` answering `{"value": ...}` or 404 when absent, and `DELETE`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use examforge_core::error::StorageError;
use examforge_core::traits::SnapshotStore;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// The authoritative remote tier.
pub struct RemoteStore {
    base_url: Url,
    api_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl RemoteStore {
    pub fn new(
        base_url: &str,
        api_token: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StorageError::Unavailable(format!("invalid base URL '{base_url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| StorageError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            api_token: api_token.filter(|t| !t.is_empty()),
            timeout_secs,
            client,
        })
    }

    fn url_for(&self, key: &str) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StorageError::Unavailable(format!("base URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(["v1", "storage", key]);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, StorageError> {
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Network(format!("request timed out after {}s", self.timeout_secs))
            } else {
                StorageError::Network(e.to_string())
            }
        })
    }
}

#[derive(Serialize)]
struct PutBody<'a> {
    value: &'a Value,
}

#[derive(Deserialize)]
struct GetBody {
    value: Value,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turn a non-success response into `StorageError::Status`.
async fn status_error(response: reqwest::Response) -> StorageError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    StorageError::Status { status, message }
}

#[async_trait]
impl SnapshotStore for RemoteStore {
    fn name(&self) -> &str {
        "remote"
    }

    #[instrument(skip(self, value), fields(key = %key))]
    async fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let url = self.url_for(key)?;
        let response = self
            .send(self.request(reqwest::Method::PUT, url).json(&PutBody { value }))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let url = self.url_for(key)?;
        let response = self.send(self.request(reqwest::Method::GET, url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        let body: GetBody = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(format!("failed to parse response: {e}")))?;
        Ok(Some(body.value))
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        let url = self.url_for(key)?;
        let response = self.send(self.request(reqwest::Method::DELETE, url)).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(status_error(response).await)
    }
}

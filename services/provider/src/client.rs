//! HTTP client for the unikernel cloud instance API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use ukc_reconcile::Context;

use crate::api::{ApiResponse, CreateInstanceRequest, InstanceEntry, StartRequest, StopRequest};
use crate::error::{Error, Result};
use crate::service::{InstancesService, MetroInstances, ServiceFactory};

/// Default endpoint template; `{metro}` is replaced per call.
pub const DEFAULT_ENDPOINT: &str = "https://api.{metro}.kraft.cloud/v1";

/// Default transport timeout for a single API call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// API base URL template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Base URL for a metro, without a trailing slash.
    pub fn for_metro(&self, metro: &str) -> String {
        self.0
            .replace("{metro}", metro)
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

/// Instance API client authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct KraftCloudClient {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl KraftCloudClient {
    /// Create a new client.
    pub fn new(token: &str, endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::ClientConstruction("token is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| Error::ClientConstruction("invalid token format".to_string()))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::ClientConstruction(e.to_string()))?;

        Ok(Self { http, endpoint })
    }
}

impl InstancesService for KraftCloudClient {
    fn scoped(&self, metro: &str) -> Box<dyn MetroInstances> {
        Box::new(MetroClient {
            http: self.http.clone(),
            base_url: self.endpoint.for_metro(metro),
            metro: metro.to_string(),
        })
    }
}

/// Builds a [`KraftCloudClient`] from a token.
#[derive(Debug, Clone)]
pub struct KraftCloudFactory {
    endpoint: Endpoint,
    timeout: Duration,
}

impl KraftCloudFactory {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

impl ServiceFactory for KraftCloudFactory {
    fn new_service(&self, token: &[u8]) -> Result<Arc<dyn InstancesService>> {
        let token = std::str::from_utf8(token)
            .map_err(|_| Error::ClientConstruction("token is not valid UTF-8".to_string()))?;
        let client = KraftCloudClient::new(token, self.endpoint.clone(), self.timeout)?;
        Ok(Arc::new(client))
    }
}

/// Client bound to one metro's base URL.
struct MetroClient {
    http: reqwest::Client,
    base_url: String,
    metro: String,
}

impl MetroClient {
    /// `<base>/instances/<segments...>`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::ClientConstruction(format!("invalid endpoint {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::ClientConstruction(format!("endpoint {} cannot have a path", self.base_url))
            })?
            .pop_if_empty()
            .push("instances")
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<ApiResponse<T>> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(metro = %self.metro, status = %status, body = %body, "Instance API call failed");
            return Err(error_for_status(status, &body));
        }

        response
            .json::<ApiResponse<T>>()
            .await
            .map_err(|e| Error::Transient(format!("cannot decode response: {}", e)))
    }

    /// Send a request whose response must contain exactly the instance.
    async fn send_for_entry(&self, request: RequestBuilder) -> Result<InstanceEntry> {
        let response = self.send::<InstanceEntry>(request).await?;
        let entry = response
            .into_first_entry()
            .ok_or_else(|| Error::NotFound("response contained no instance".to_string()))?;
        check_entry(entry)
    }

    /// Send a request that only needs acknowledging.
    async fn send_for_ack(&self, request: RequestBuilder) -> Result<()> {
        let response = self.send::<InstanceEntry>(request).await?;
        match response.into_first_entry() {
            Some(entry) => check_entry(entry).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MetroInstances for MetroClient {
    fn metro(&self) -> &str {
        &self.metro
    }

    async fn get(&self, ctx: &Context, id: &str) -> Result<InstanceEntry> {
        let url = self.url(&[id])?;
        debug!(url = %url, "Fetching instance");
        ctx.run(self.send_for_entry(self.http.get(url))).await
    }

    async fn create(
        &self,
        ctx: &Context,
        request: &CreateInstanceRequest,
    ) -> Result<InstanceEntry> {
        let url = self.url(&[])?;
        debug!(url = %url, image = %request.image, memory_mb = request.memory_mb, "Creating instance");
        ctx.run(self.send_for_entry(self.http.post(url).json(request)))
            .await
    }

    async fn start(&self, ctx: &Context, id: &str, delay: Duration) -> Result<()> {
        let url = self.url(&[id, "start"])?;
        let body = StartRequest {
            waittime_ms: delay.as_millis() as u64,
        };
        debug!(url = %url, "Starting instance");
        ctx.run(self.send_for_ack(self.http.put(url).json(&body)))
            .await
    }

    async fn stop(&self, ctx: &Context, id: &str, delay: Duration, force: bool) -> Result<()> {
        let url = self.url(&[id, "stop"])?;
        let body = StopRequest {
            drain_timeout_ms: delay.as_millis() as u64,
            force,
        };
        debug!(url = %url, force, "Stopping instance");
        ctx.run(self.send_for_ack(self.http.put(url).json(&body)))
            .await
    }

    async fn delete(&self, ctx: &Context, id: &str) -> Result<()> {
        let url = self.url(&[id])?;
        debug!(url = %url, "Deleting instance");
        ctx.run(self.send_for_ack(self.http.delete(url))).await
    }
}

/// Reject entries the API flagged as failed.
fn check_entry(entry: InstanceEntry) -> Result<InstanceEntry> {
    if !entry.is_error() {
        return Ok(entry);
    }

    let message = entry
        .message
        .clone()
        .unwrap_or_else(|| format!("instance {} reported an error", entry.uuid));
    if message.to_lowercase().contains("not found") {
        Err(Error::NotFound(message))
    } else {
        Err(Error::Transient(message))
    }
}

/// Map a non-success HTTP status to an error.
fn error_for_status(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(body)
        .ok()
        .and_then(|response| {
            response
                .message
                .or_else(|| response.errors.into_iter().next().map(|e| e.message))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("{}: {}", status, body));

    match status {
        StatusCode::NOT_FOUND => Error::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            Error::Validation(message)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized(message),
        _ => Error::Transient(message),
    }
}

//! REST client for resource snapshots and mutations.
//!
//! Every resource kind exposes `GET {base}/{segment}/{id}` returning
//! `{ version, payload }` and mutation endpoints under
//! `{base}/{segment}/{id}/{action}` returning the post-mutation snapshot.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::models::{MutationId, ResourceHandle, ServerSnapshot};
use crate::util::{compact_text, is_http_url, normalize_text_option};

const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Source of authoritative resource snapshots
#[async_trait]
pub trait ResourceApi: Send + Sync {
    async fn fetch(&self, handle: &ResourceHandle) -> Result<ServerSnapshot>;
}

/// HTTP verb of a mutation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMethod {
    Post,
    Put,
}

#[derive(Clone)]
pub struct RestClient {
    base_url: String,
    client: reqwest::Client,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let base_url = config
            .api_base_url
            .clone()
            .ok_or_else(|| Error::Config("api_base_url is not configured".to_string()))?;
        Self::new(base_url, config.fetch_timeout())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn resource_url(&self, handle: &ResourceHandle) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            handle.kind.path_segment(),
            urlencoding::encode(&handle.id)
        )
    }

    pub fn action_url(&self, handle: &ResourceHandle, action: &str) -> String {
        let action = action.trim_matches('/');
        if action.is_empty() {
            self.resource_url(handle)
        } else {
            format!("{}/{action}", self.resource_url(handle))
        }
    }

    pub async fn fetch_snapshot(&self, handle: &ResourceHandle) -> Result<ServerSnapshot> {
        let response = self
            .client
            .get(self.resource_url(handle))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        read_snapshot(response).await
    }

    /// Send a mutation; the mutation id doubles as the idempotency key.
    pub async fn send_mutation(
        &self,
        handle: &ResourceHandle,
        method: MutationMethod,
        action: &str,
        body: &Value,
        mutation_id: MutationId,
    ) -> Result<ServerSnapshot> {
        let url = self.action_url(handle, action);
        let request = match method {
            MutationMethod::Post => self.client.post(url),
            MutationMethod::Put => self.client.put(url),
        };
        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .header(IDEMPOTENCY_HEADER, mutation_id.to_string())
            .json(body)
            .send()
            .await?;
        read_snapshot(response).await
    }
}

#[async_trait]
impl ResourceApi for RestClient {
    async fn fetch(&self, handle: &ResourceHandle) -> Result<ServerSnapshot> {
        self.fetch_snapshot(handle).await
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

async fn read_snapshot(response: reqwest::Response) -> Result<ServerSnapshot> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::RejectedByServer {
            status: status.as_u16(),
            reason: parse_api_error(status, &body),
        });
    }
    parse_snapshot(&body)
}

/// Parse a `{ version, payload }` body.
pub fn parse_snapshot(body: &str) -> Result<ServerSnapshot> {
    serde_json::from_str::<ServerSnapshot>(body).map_err(|error| {
        Error::MalformedResponse(format!("{error}: {}", compact_text(body)))
    })
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
    } else {
        trimmed
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::Config("API base URL must not be empty".to_string()))?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::Config(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

//! Sync client configuration.
//!
//! Provides a unified `SyncConfig` used by every client to locate the REST
//! API and push endpoint and to bound network operations.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, is_ws_url, normalize_text_option};

const DEFAULT_MUTATION_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RECONCILE_ATTEMPTS: u32 = 3;
const DEFAULT_RECONCILE_BACKOFF_MS: u64 = 250;
const DEFAULT_RECONCILE_MAX_BACKOFF_MS: u64 = 5_000;
const DEFAULT_DEDUP_CAPACITY: usize = 500;
const DEFAULT_DEDUP_MAX_AGE_SECS: u64 = 300;
const DEFAULT_RECONNECT_BACKOFF_MS: u64 = 500;
const DEFAULT_RECONNECT_MAX_BACKOFF_MS: u64 = 30_000;

/// Client configuration. Every field has a default so partial files load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// REST base URL, e.g. `https://api.example.com/v1`
    pub api_base_url: Option<String>,
    /// Push websocket URL, e.g. `wss://push.example.com/live`
    pub push_url: Option<String>,
    pub mutation_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
    pub reconcile_max_attempts: u32,
    pub reconcile_backoff_ms: u64,
    pub reconcile_max_backoff_ms: u64,
    pub dedup_capacity: usize,
    pub dedup_max_age_secs: u64,
    pub reconnect_backoff_ms: u64,
    pub reconnect_max_backoff_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            push_url: None,
            mutation_timeout_ms: DEFAULT_MUTATION_TIMEOUT_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            reconcile_max_attempts: DEFAULT_RECONCILE_ATTEMPTS,
            reconcile_backoff_ms: DEFAULT_RECONCILE_BACKOFF_MS,
            reconcile_max_backoff_ms: DEFAULT_RECONCILE_MAX_BACKOFF_MS,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            dedup_max_age_secs: DEFAULT_DEDUP_MAX_AGE_SECS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS,
            reconnect_max_backoff_ms: DEFAULT_RECONNECT_MAX_BACKOFF_MS,
        }
    }
}

/// Bounded retry with exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling and capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SyncConfig::default().reconcile_policy()
    }
}

impl SyncConfig {
    /// Load a JSON config file; a missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {}",
                path.display(),
                error
            ))
        })?;
        config.validate()
    }

    /// Normalize URLs and check that every bound is usable.
    pub fn validate(mut self) -> Result<Self> {
        self.api_base_url = normalize_url(self.api_base_url.take(), "api_base_url", is_http_url)?;
        self.push_url = normalize_url(self.push_url.take(), "push_url", is_ws_url)?;

        for (field, value) in [
            ("mutation_timeout_ms", self.mutation_timeout_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
            ("reconcile_backoff_ms", self.reconcile_backoff_ms),
            ("reconnect_backoff_ms", self.reconnect_backoff_ms),
            ("dedup_max_age_secs", self.dedup_max_age_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{field} must be greater than zero")));
            }
        }
        if self.reconcile_max_attempts == 0 {
            return Err(Error::Config(
                "reconcile_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dedup_capacity == 0 {
            return Err(Error::Config(
                "dedup_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    pub const fn mutation_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_timeout_ms)
    }

    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub const fn dedup_max_age(&self) -> Duration {
        Duration::from_secs(self.dedup_max_age_secs)
    }

    pub fn reconcile_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.reconcile_max_attempts,
            initial_backoff: Duration::from_millis(self.reconcile_backoff_ms),
            max_backoff: Duration::from_millis(
                self.reconcile_max_backoff_ms.max(self.reconcile_backoff_ms),
            ),
            timeout: self.fetch_timeout(),
        }
    }

    /// Reconnect policy for the push transport; attempts are unbounded.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: u32::MAX,
            initial_backoff: Duration::from_millis(self.reconnect_backoff_ms),
            max_backoff: Duration::from_millis(
                self.reconnect_max_backoff_ms.max(self.reconnect_backoff_ms),
            ),
            timeout: self.fetch_timeout(),
        }
    }
}

fn normalize_url(
    raw: Option<String>,
    field: &str,
    scheme_ok: fn(&str) -> bool,
) -> Result<Option<String>> {
    let Some(value) = normalize_text_option(raw) else {
        return Ok(None);
    };
    if scheme_ok(&value) {
        Ok(Some(value.trim_end_matches('/').to_string()))
    } else {
        Err(Error::Config(format!(
            "{field} has an unsupported scheme: {value}"
        )))
    }
}

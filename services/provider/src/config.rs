//! Configuration for the provider.

use std::time::Duration;

use anyhow::{Context, Result};
use ukc_reconcile::DEFAULT_POLL_INTERVAL;

use crate::client::{Endpoint, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT};
use crate::external::FetchErrorPolicy;

/// Provider configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding instance records, provider configs and secrets.
    pub state_dir: String,

    /// Interval between reconciliation passes.
    pub poll_interval: Duration,

    /// API endpoint template; `{metro}` is substituted per call.
    pub api_endpoint: Endpoint,

    /// Transport timeout for a single API call.
    pub http_timeout: Duration,

    /// How Observe treats failed fetches.
    pub fetch_error_policy: FetchErrorPolicy,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let state_dir = std::env::var("UKC_STATE_DIR")
            .unwrap_or_else(|_| "/var/lib/ukc-provider".to_string());

        let poll_interval = Duration::from_secs(env_u64(
            "UKC_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL.as_secs(),
        )?);

        let api_endpoint = Endpoint::new(
            std::env::var("UKC_API_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
        );

        let http_timeout = Duration::from_secs(env_u64(
            "UKC_HTTP_TIMEOUT_SECS",
            DEFAULT_TIMEOUT.as_secs(),
        )?);

        let fetch_error_policy = match std::env::var("UKC_FETCH_ERROR_POLICY") {
            Ok(value) => value
                .parse::<FetchErrorPolicy>()
                .map_err(anyhow::Error::msg)
                .context("invalid UKC_FETCH_ERROR_POLICY")?,
            Err(_) => FetchErrorPolicy::default(),
        };

        let log_level = std::env::var("UKC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        if poll_interval.is_zero() {
            anyhow::bail!("UKC_POLL_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            state_dir,
            poll_interval,
            api_endpoint,
            http_timeout,
            fetch_error_policy,
            log_level,
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("invalid {}: {}", name, value)),
        Err(_) => Ok(default),
    }
}

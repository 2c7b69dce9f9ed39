//! Backend health probe
//!
//! Pings the dashboard API's health endpoint on every `backendHealth`
//! refresh and caches the latest report for the status badge.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::RwLock;

use super::base::{source_callback, ProbeError, RefreshSource};
use crate::refresh::{RefreshCallback, RefreshKey};

/// Environment variable holding the API base URL
pub const API_URL_ENV: &str = "DASHBOARD_API_URL";

/// Configuration for the health probe
#[derive(Debug, Clone)]
pub struct HealthProbeConfig {
    /// API base URL
    pub base_url: String,
    /// Path of the health endpoint
    pub path: String,
    /// Request timeout
    pub timeout: Duration,
}

impl HealthProbeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: "/health".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Builds a config from [`API_URL_ENV`], if set
    pub fn from_env() -> Option<Self> {
        std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the health endpoint
    pub fn url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

/// Health classification of the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum HealthStatus {
    /// Health endpoint answered 2xx
    Healthy,
    /// Health endpoint answered with another status
    Unhealthy { code: u16 },
    /// No response arrived
    Unreachable,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Result of one health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Round trip time in milliseconds
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
}

/// Probe for the backend health endpoint
pub struct HealthProbe {
    client: Client,
    config: HealthProbeConfig,
    last_report: RwLock<Option<HealthReport>>,
}

impl HealthProbe {
    /// Creates a probe with its own HTTP client
    pub fn new(config: HealthProbeConfig) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            config,
            last_report: RwLock::new(None),
        })
    }

    /// Returns a callback for the `backendHealth` key that spawns one check per refresh
    pub fn subscriber(self: Arc<Self>, runtime: Handle) -> RefreshCallback {
        source_callback(self, runtime)
    }

    /// Returns the most recent report, if any check has completed
    pub async fn last_report(&self) -> Option<HealthReport> {
        self.last_report.read().await.clone()
    }

    /// Checks the health endpoint once and caches the report.
    ///
    /// Any HTTP response yields a report; only transport failures are errors.
    pub async fn check(&self) -> Result<HealthReport, ProbeError> {
        let started = Instant::now();
        let result = self.client.get(self.config.url()).send().await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (status, outcome) = match result {
            Ok(response) if response.status().is_success() => (HealthStatus::Healthy, Ok(())),
            Ok(response) => (
                HealthStatus::Unhealthy {
                    code: response.status().as_u16(),
                },
                Ok(()),
            ),
            Err(e) => (HealthStatus::Unreachable, Err(e)),
        };

        let report = HealthReport {
            status,
            latency_ms,
            checked_at: Utc::now(),
        };
        *self.last_report.write().await = Some(report.clone());

        tracing::debug!("Backend health: {:?} in {}ms", report.status, latency_ms);

        outcome?;
        Ok(report)
    }
}

#[async_trait]
impl RefreshSource for HealthProbe {
    fn key(&self) -> RefreshKey {
        RefreshKey::BackendHealth
    }

    fn name(&self) -> &'static str {
        "Backend Health Probe"
    }

    async fn refresh(&self) -> Result<(), ProbeError> {
        match self.check().await?.status {
            HealthStatus::Unhealthy { code } => Err(ProbeError::Unhealthy(code)),
            _ => Ok(()),
        }
    }
}

/// Loki Client Module
///
/// This module handles all interactions with the Loki query API.
/// It wraps a reqwest client and provides a single-page `query_range` call
/// with retry on connection failures, plus a readiness probe.
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{normalize_base_url, Settings};
use crate::error::{PipelineError, Result};
use crate::etl::extract::QueryBackend;

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";
const READY_PATH: &str = "/ready";

/// Body of a `query_range` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRangeResponse {
    #[serde(default)]
    pub data: QueryRangeData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRangeData {
    #[serde(default)]
    pub result: Vec<LogStream>,
}

/// `[timestamp_ns, line]` pairs of one stream; labels are not needed
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogStream {
    #[serde(default)]
    pub values: Vec<(String, String)>,
}

pub struct LokiClient {
    client: reqwest::Client,
    base_url: String,
    query: String,
    page_size: usize,
    max_retries: u32,
    retry_delay: Duration,
}

impl LokiClient {
    /// Create a new client for the Loki instance in `settings`
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let base_url = normalize_base_url(&settings.loki_url).context("Invalid Loki URL")?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout)
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build Loki HTTP client")?;

        Ok(Self {
            client,
            base_url,
            query: settings.query.clone(),
            page_size: settings.batch_size,
            max_retries: settings.max_retries,
            retry_delay: settings.retry_delay,
        })
    }

    /// Get the endpoint URL this client talks to
    pub fn endpoint(&self) -> &str {
        &self.base_url
    }

    /// Check the readiness endpoint. Never fails; any error means "not ready".
    pub async fn check_ready(&self) -> bool {
        let url = format!("{}{}", self.base_url, READY_PATH);

        match self.client.get(&url).send().await.and_then(|r| r.error_for_status()) {
            Ok(_) => true,
            Err(e) => {
                warn!("Loki readiness check failed: {}", e);
                false
            }
        }
    }

    /// Fetch one page of `[start_ns, end_ns)` in ascending order
    pub async fn query_range(&self, start_ns: i64, end_ns: i64) -> Result<QueryRangeResponse> {
        let url = format!("{}{}", self.base_url, QUERY_RANGE_PATH);
        let params = [
            ("query", self.query.clone()),
            ("start", start_ns.to_string()),
            ("end", end_ns.to_string()),
            ("limit", self.page_size.to_string()),
            ("direction", "forward".to_string()),
        ];

        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            debug!("Querying Loki {} (start={}, end={}, attempt {})", url, start_ns, end_ns, attempt);

            let response = match self.client.get(&url).query(&params).send().await {
                Ok(response) => response,
                Err(e) if is_transport_failure(&e) && attempt <= self.max_retries => {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        "Connection to Loki failed, retrying in {:?}: {}",
                        self.retry_delay,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    continue;
                }
                Err(e) if is_transport_failure(&e) => {
                    return Err(PipelineError::Connectivity { endpoint: url, attempts: attempt, source: e });
                }
                Err(source) => return Err(PipelineError::Request { endpoint: url, source }),
            };

            let response = response
                .error_for_status()
                .map_err(|source| PipelineError::Request { endpoint: url.clone(), source })?;

            return response
                .json::<QueryRangeResponse>()
                .await
                .map_err(|source| PipelineError::Request { endpoint: url, source });
        }
    }
}

/// Failures to connect or to exchange the request at all, as opposed to a
/// response that arrived with a bad status or body
fn is_transport_failure(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

#[async_trait]
impl QueryBackend for LokiClient {
    async fn fetch_page(&self, start_ns: i64, end_ns: i64) -> Result<Vec<LogStream>> {
        Ok(self.query_range(start_ns, end_ns).await?.data.result)
    }
}

/// VictoriaLogs Client Module
///
/// This module handles all writes to the storage backend:
/// - Health checks
/// - Schema creation (`/execute`)
/// - Single-row inserts (`/write`, JSONEachRow)
///
/// Schema management and writes may point at different base URLs. Requests
/// that fail with a transient status (429, 500, 502, 503, 504), a connection
/// error or a timeout are retried with exponential backoff; anything else
/// fails immediately. HTTPS endpoints are verified against the system trust
/// store.
pub mod backoff;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::config::{normalize_base_url, Settings};
use crate::error::{PipelineError, Result};
use crate::etl::load::Sink;
use crate::models::NormalizedRecord;

use backoff::BackoffPolicy;

const HEALTH_PATH: &str = "/health";
const EXECUTE_PATH: &str = "/execute";
const WRITE_PATH: &str = "/write";

pub const INSERT_QUERY: &str = "INSERT INTO audit_logs FORMAT JSONEachRow";

pub const AUDIT_LOGS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_logs (
    timestamp DateTime,
    event_record_id UInt64,
    error_code Nullable(Int32),
    severity Nullable(Int32),
    state Nullable(Int32),
    start_time Nullable(DateTime),
    trace_type Nullable(String),
    event_class_desc Nullable(String),
    login_name Nullable(String),
    host_name Nullable(String),
    text_data Nullable(String),
    application_name Nullable(String),
    database_name Nullable(String),
    object_name Nullable(String),
    role_name Nullable(String),
    computer String,
    event_id String,
    source String,
    environment String,
    region String
) ENGINE = MergeTree()
ORDER BY (timestamp, event_record_id);
"#;

const RETRYABLE_STATUSES: [StatusCode; 5] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

pub struct VictoriaClient {
    client: reqwest::Client,
    write_url: String,
    schema_url: String,
    max_retries: u32,
    retry_policy: BackoffPolicy,
}

impl VictoriaClient {
    /// Create a new client for the VictoriaLogs endpoints in `settings`
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let write_url = normalize_base_url(&settings.victoria_url).context("Invalid VictoriaLogs URL")?;
        let schema_url =
            normalize_base_url(&settings.victoria_schema_url).context("Invalid VictoriaLogs schema URL")?;

        let client = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout)
            .timeout(settings.request_timeout)
            .build()
            .context("Failed to build VictoriaLogs HTTP client")?;

        Ok(Self {
            client,
            write_url,
            schema_url,
            max_retries: settings.max_retries,
            retry_policy: BackoffPolicy::doubling(settings.retry_delay),
        })
    }

    /// Get the endpoint URL records are written to
    pub fn endpoint(&self) -> &str {
        &self.write_url
    }

    /// Send a request, retrying transient failures. `build` is called once per attempt.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> anyhow::Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;

        loop {
            debug!("Sending request to {} (attempt {})", url, attempt + 1);

            let transient = match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if RETRYABLE_STATUSES.contains(&response.status()) => {
                    format!("status {}", response.status())
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(anyhow!("{} returned {}: {}", url, status, body));
                }
                Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => e.to_string(),
                Err(e) => return Err(anyhow::Error::new(e).context(format!("Request to {} failed", url))),
            };

            if attempt >= self.max_retries {
                return Err(anyhow!("{} failed after {} attempts: {}", url, attempt + 1, transient));
            }

            let delay = self.retry_policy.next_delay(attempt);
            warn!(
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "Transient VictoriaLogs error, retrying in {:?}: {}",
                delay,
                transient
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Sink for VictoriaClient {
    async fn ensure_schema(&self) -> Result<()> {
        let url = format!("{}{}", self.schema_url, EXECUTE_PATH);

        self.send_with_retry(&url, || self.client.post(&url).body(AUDIT_LOGS_SCHEMA))
            .await
            .map_err(|e| PipelineError::Schema(format!("{:#}", e)))?;

        info!("audit_logs schema is in place");
        Ok(())
    }

    async fn insert(&self, record: NormalizedRecord) -> Result<()> {
        let url = format!("{}{}", self.write_url, WRITE_PATH);
        let event_record_id = record.event_record_id;

        self.send_with_retry(&url, || self.client.post(&url).query(&[("query", INSERT_QUERY)]).json(&record))
            .await
            .map_err(|e| PipelineError::SinkWrite { event_record_id, message: format!("{:#}", e) })?;

        debug!(event_record_id, "Inserted record");
        Ok(())
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}{}", self.write_url, HEALTH_PATH);

        match self.send_with_retry(&url, || self.client.get(&url)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("VictoriaLogs health check failed: {:#}", e);
                false
            }
        }
    }
}

/// Configuration Module
///
/// Immutable runtime settings. Built once from the CLI/environment at startup
/// and handed to each component's constructor.
use std::time::Duration;

pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100";
pub const DEFAULT_VICTORIA_URL: &str = "http://localhost:8428";
pub const DEFAULT_LOKI_QUERY: &str = r#"{topic="iaas-database-auditlogs"}"#;

#[derive(Debug, Clone)]
pub struct Settings {
    pub loki_url: String,
    pub victoria_url: String,
    /// Endpoint used for schema management; may differ from the write endpoint
    pub victoria_schema_url: String,
    pub query: String,
    pub query_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub log_level: String,
    /// 0 keeps every id for the process lifetime
    pub dedup_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            loki_url: DEFAULT_LOKI_URL.to_string(),
            victoria_url: DEFAULT_VICTORIA_URL.to_string(),
            victoria_schema_url: DEFAULT_VICTORIA_URL.to_string(),
            query: DEFAULT_LOKI_QUERY.to_string(),
            query_interval: Duration::from_secs(300),
            batch_size: 1000,
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            log_level: "info".to_string(),
            dedup_capacity: 0,
        }
    }
}

/// Check that a base URL is absolute http(s) with a host, and strip any trailing slash
pub fn normalize_base_url(url: &str) -> anyhow::Result<String> {
    let parsed = reqwest::Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL {}: {}", url, e))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("Unsupported URL scheme '{}' in {}", parsed.scheme(), url);
    }
    if parsed.host_str().is_none() {
        anyhow::bail!("URL {} has no host", url);
    }

    Ok(url.trim_end_matches('/').to_string())
}

/// CLI Module
///
/// Command-line interface configuration using clap. Every option can also be
/// supplied through the environment (or a `.env` file).
use chrono::{DateTime, Utc};
use clap::Parser;
use std::time::Duration;

use crate::config::{normalize_base_url, Settings, DEFAULT_LOKI_QUERY, DEFAULT_LOKI_URL, DEFAULT_VICTORIA_URL};

/// Audit Log Forwarder
///
/// Pull SQL Server audit logs from Loki, parse and deduplicate them, and write them to VictoriaLogs
#[derive(Parser, Debug)]
#[command(name = "audit-log-forwarder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Loki base URL
    #[arg(long, env = "LOKI_URL", value_name = "URL", default_value = DEFAULT_LOKI_URL)]
    pub loki_url: String,

    /// VictoriaLogs base URL used for health checks and inserts
    #[arg(long, env = "VICTORIA_URL", value_name = "URL", default_value = DEFAULT_VICTORIA_URL)]
    pub victoria_url: String,

    /// Base URL for schema management (defaults to the VictoriaLogs URL)
    #[arg(long, env = "VICTORIA_SCHEMA_URL", value_name = "URL")]
    pub victoria_schema_url: Option<String>,

    /// LogQL stream selector
    #[arg(short = 'q', long, env = "LOKI_QUERY", default_value = DEFAULT_LOKI_QUERY)]
    pub query: String,

    /// Seconds between cycles
    #[arg(short = 'i', long, env = "QUERY_INTERVAL", value_name = "SECONDS", default_value = "300")]
    pub interval: u64,

    /// Page size for Loki queries
    #[arg(short = 'b', long, env = "BATCH_SIZE", value_name = "SIZE", default_value = "1000")]
    pub batch_size: usize,

    /// Maximum number of retry attempts
    #[arg(long, env = "MAX_RETRIES", value_name = "COUNT", default_value = "3")]
    pub max_retries: u32,

    /// Retry delay in seconds
    #[arg(long, env = "RETRY_DELAY", value_name = "SECONDS", default_value = "5")]
    pub retry_delay: u64,

    /// Per-request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", value_name = "SECONDS", default_value = "30")]
    pub request_timeout: u64,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Remember at most this many record ids (0 = unbounded)
    #[arg(long, env = "DEDUP_CAPACITY", value_name = "COUNT", default_value = "0")]
    pub dedup_capacity: usize,

    /// Run a single cycle over the last interval and exit
    #[arg(long)]
    pub once: bool,

    /// Start of an explicit window to process once (RFC 3339)
    #[arg(short = 's', long, value_name = "TIME", requires = "end")]
    pub start: Option<DateTime<Utc>>,

    /// End of an explicit window to process once (RFC 3339)
    #[arg(short = 'e', long, value_name = "TIME", requires = "start")]
    pub end: Option<DateTime<Utc>>,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                anyhow::bail!("Start ({}) must be before end ({})", start, end);
            }
        }

        if self.interval == 0 {
            anyhow::bail!("Interval must be greater than 0");
        }

        if self.batch_size == 0 {
            anyhow::bail!("Batch size must be greater than 0");
        }

        if self.request_timeout == 0 {
            anyhow::bail!("Request timeout must be greater than 0");
        }

        if self.query.trim().is_empty() {
            anyhow::bail!("Loki query must not be empty");
        }

        normalize_base_url(&self.loki_url)?;
        normalize_base_url(&self.victoria_url)?;
        if let Some(url) = &self.victoria_schema_url {
            normalize_base_url(url)?;
        }

        tracing_subscriber::EnvFilter::try_new(self.log_level.to_lowercase())
            .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", self.log_level, e))?;

        Ok(())
    }

    /// Explicit window given with `--start`/`--end`
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.start.zip(self.end)
    }

    /// Build the immutable runtime settings
    pub fn settings(&self) -> Settings {
        Settings {
            loki_url: self.loki_url.clone(),
            victoria_url: self.victoria_url.clone(),
            victoria_schema_url: self.victoria_schema_url.clone().unwrap_or_else(|| self.victoria_url.clone()),
            query: self.query.clone(),
            query_interval: Duration::from_secs(self.interval),
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            retry_delay: Duration::from_secs(self.retry_delay),
            request_timeout: Duration::from_secs(self.request_timeout),
            log_level: self.log_level.to_lowercase(),
            dedup_capacity: self.dedup_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("audit-log-forwarder").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_settings_from_args() {
        let cli = parse(&[
            "--loki-url",
            "http://loki:3100/",
            "--victoria-url",
            "https://victoria:8428",
            "--interval",
            "60",
            "--batch-size",
            "500",
            "--retry-delay",
            "1",
            "--log-level",
            "DEBUG",
        ]);
        cli.validate().unwrap();

        let settings = cli.settings();
        assert_eq!(settings.loki_url, "http://loki:3100/");
        assert_eq!(settings.victoria_schema_url, "https://victoria:8428");
        assert_eq!(settings.query_interval, Duration::from_secs(60));
        assert_eq!(settings.batch_size, 500);
        assert_eq!(settings.retry_delay, Duration::from_secs(1));
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.dedup_capacity, 0);
    }

    #[test]
    fn test_separate_schema_url() {
        let cli = parse(&["--victoria-schema-url", "http://clickhouse:8123"]);
        assert_eq!(cli.settings().victoria_schema_url, "http://clickhouse:8123");
    }

    #[test]
    fn test_window() {
        let cli = parse(&["--start", "2024-03-15T08:00:00Z", "--end", "2024-03-15T09:00:00Z"]);
        cli.validate().unwrap();

        let (start, end) = cli.window().unwrap();
        assert_eq!((end - start).num_minutes(), 60);
    }

    #[test]
    fn test_start_requires_end() {
        let result = Cli::try_parse_from(["audit-log-forwarder", "--start", "2024-03-15T08:00:00Z"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_max_retries_range() {
        assert_eq!(parse(&["--max-retries", "7"]).settings().max_retries, 7);
        assert!(Cli::try_parse_from(["audit-log-forwarder", "--max-retries", "4294967296"]).is_err());
        assert!(Cli::try_parse_from(["audit-log-forwarder", "--max-retries", "-1"]).is_err());
    }

    #[test]
    fn test_validation() {
        assert!(parse(&["--start", "2024-03-15T09:00:00Z", "--end", "2024-03-15T08:00:00Z"]).validate().is_err());
        assert!(parse(&["--batch-size", "0"]).validate().is_err());
        assert!(parse(&["--interval", "0"]).validate().is_err());
        assert!(parse(&["--query", "  "]).validate().is_err());
        assert!(parse(&["--loki-url", "loki:3100"]).validate().is_err());
        assert!(parse(&["--log-level", "info,=="]).validate().is_err());
    }
}

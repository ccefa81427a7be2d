/// Audit Log Forwarder
///
/// An ETL pipeline that pulls SQL Server audit logs from Loki, parses and
/// deduplicates them, and writes them to VictoriaLogs.
mod cli;
mod config;
mod error;
mod etl;
mod loki;
mod models;
mod pipeline;
mod victoria;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::Cli;
use etl::dedup;
use loki::LokiClient;
use pipeline::{CycleStats, Pipeline, PipelineConfig};
use tokio::sync::watch;
use victoria::VictoriaClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    cli.validate()?;
    let settings = cli.settings();

    // RUST_LOG wins over --log-level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .init();

    println!("🚀 Starting Audit Log Forwarder...");

    let loki_client = LokiClient::new(&settings).context("Failed to create Loki client")?;
    if loki_client.check_ready().await {
        println!("✅ Loki ready at: {}", loki_client.endpoint());
    } else {
        tracing::warn!("Loki at {} is not ready yet, continuing", loki_client.endpoint());
    }

    let victoria_client = VictoriaClient::new(&settings).context("Failed to create VictoriaLogs client")?;

    println!("\n💾 Connecting to VictoriaLogs at {}...", victoria_client.endpoint());
    let mut pipeline = Pipeline::new(
        loki_client,
        victoria_client,
        dedup::from_capacity(settings.dedup_capacity),
        PipelineConfig::from(&settings),
    );

    pipeline
        .setup()
        .await
        .inspect_err(|e| tracing::error!("Setup failed: {}", e))
        .context("Failed to initialize VictoriaLogs")?;
    println!("✅ audit_logs schema ready");

    tracing::info!(query = %settings.query, "Audit Log Forwarder initialized successfully");

    if let Some((start, end)) = cli.window() {
        let stats = pipeline.run_cycle(start, end).await.context("Pipeline execution failed")?;
        print_summary(&stats);
        return Ok(());
    }

    if cli.once {
        let end = Utc::now();
        let stats = pipeline.run_cycle(end - settings.query_interval, end).await.context("Pipeline execution failed")?;
        print_summary(&stats);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, stopping after the current cycle");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::warn!("Unable to listen for Ctrl-C: {}", e);
                // Hold the sender so the pipeline keeps running
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    println!("\n🔁 Forwarding every {}s (Ctrl-C to stop)", settings.query_interval.as_secs());
    pipeline.run_forever(shutdown_rx).await;

    println!("\n✨ Forwarder stopped");

    Ok(())
}

fn print_summary(stats: &CycleStats) {
    println!("\n✨ Pipeline execution complete!");
    println!("📦 Processed: {}", format_number(stats.processed as u64));
    println!("🔁 Duplicates: {}", format_number(stats.duplicates as u64));
    if stats.malformed > 0 || stats.failed > 0 {
        println!("⚠️  Malformed: {}, failed inserts: {}", stats.malformed, stats.failed);
    }
    println!("⏱️  {:.2}s ({:.1} logs/sec)", stats.elapsed_time.as_secs_f64(), stats.records_per_second());
}

/// Format a number with thousand separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, c) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }

    result.chars().rev().collect()
}

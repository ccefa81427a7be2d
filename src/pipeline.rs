/// Pipeline Module
///
/// Orchestrates one processing cycle: Pull → Decode → Dedup → Parse → Load,
/// with per-record error containment and statistics tracking, plus the
/// scheduler loop that repeats cycles on a fixed interval.
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::etl::{
    dedup::DedupStore,
    extract::{pull, QueryBackend},
    load::Sink,
    transform::parse_entry,
};
use crate::models::{LogEnvelope, RawRecord};

const PROGRESS_EVERY: usize = 100;

/// Counters for a single cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleStats {
    pub processed: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub failed: usize,
    pub elapsed_time: Duration,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(processed, duplicates)`
    pub fn counts(&self) -> (usize, usize) {
        (self.processed, self.duplicates)
    }

    pub fn records_per_second(&self) -> f64 {
        let secs = self.elapsed_time.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.processed as f64 / secs
        }
    }

    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Processed => self.processed += 1,
            RecordOutcome::Duplicate => self.duplicates += 1,
            RecordOutcome::Malformed => self.malformed += 1,
            RecordOutcome::Failed => self.failed += 1,
        }
    }
}

/// Where a record left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Processed,
    Duplicate,
    Malformed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineStage {
    Decode,
    Parse,
    Load,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Decode => write!(f, "Decode"),
            PipelineStage::Parse => write!(f, "Parse"),
            PipelineStage::Load => write!(f, "Load"),
        }
    }
}

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Length of the first window and sleep between cycles
    pub query_interval: Duration,
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self { query_interval: settings.query_interval }
    }
}

/// Main forwarding pipeline
pub struct Pipeline<Q, S> {
    source: Q,
    sink: S,
    dedup: Box<dyn DedupStore>,
    config: PipelineConfig,
}

impl<Q, S> Pipeline<Q, S>
where
    Q: QueryBackend,
    S: Sink,
{
    /// Create a new pipeline instance
    pub fn new(source: Q, sink: S, dedup: Box<dyn DedupStore>, config: PipelineConfig) -> Self {
        Self { source, sink, dedup, config }
    }

    /// Verify the sink is reachable and create its schema
    pub async fn setup(&self) -> Result<()> {
        if !self.sink.check_health().await {
            return Err(PipelineError::Setup("storage backend health check failed".to_string()));
        }

        self.sink.ensure_schema().await.map_err(|e| PipelineError::Setup(e.to_string()))?;

        info!("Storage backend is healthy and schema is initialized");
        Ok(())
    }

    /// Run one cycle over `[start, end)`.
    ///
    /// Per-record failures are logged and counted; only a failed pull aborts
    /// the cycle.
    pub async fn run_cycle(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<CycleStats> {
        let started = Instant::now();
        let mut stats = CycleStats::new();

        info!("Processing logs from {} to {}", start, end);

        let Self { source, sink, dedup, .. } = self;
        let mut records = pull(&*source, start, end);

        while let Some(raw) = records.next().await {
            let raw = raw.inspect_err(|e| error!("Pull failed after {} records: {}", stats.processed, e))?;

            let outcome = process_record(&*sink, &mut **dedup, raw).await;
            stats.record(outcome);

            if outcome == RecordOutcome::Processed && stats.processed % PROGRESS_EVERY == 0 {
                info!("Processed {} logs ({} duplicates)", stats.processed, stats.duplicates);
            }
        }

        stats.elapsed_time = started.elapsed();

        info!(
            processed = stats.processed,
            duplicates = stats.duplicates,
            malformed = stats.malformed,
            failed = stats.failed,
            "Processed {} logs, skipped {} duplicates in {:.2}s",
            stats.processed,
            stats.duplicates,
            stats.elapsed_time.as_secs_f64()
        );

        Ok(stats)
    }

    /// Repeat cycles until `shutdown` flips to `true`.
    ///
    /// The first window is `[now - interval, now)`. Each later window starts
    /// where the last successful one ended, so a failed cycle is covered again
    /// by the next one.
    pub async fn run_forever(&mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.config.query_interval;
        let mut window_start = Utc::now() - interval;

        loop {
            let window_end = Utc::now();

            match self.run_cycle(window_start, window_end).await {
                Ok(stats) => {
                    let (processed, duplicates) = stats.counts();
                    info!(
                        "Completed processing cycle. Processed: {}, Duplicates: {} ({:.1} logs/sec, {} ids tracked)",
                        processed,
                        duplicates,
                        stats.records_per_second(),
                        self.dedup.len()
                    );
                    window_start = window_end;
                }
                Err(e) => error!("Error in processing cycle: {}", e),
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                Ok(()) = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Shutting down log pipeline");
    }
}

async fn process_record<S>(sink: &S, dedup: &mut dyn DedupStore, raw: RawRecord) -> RecordOutcome
where
    S: Sink + ?Sized,
{
    let envelope = match LogEnvelope::from_payload(&raw.payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(stage = %PipelineStage::Decode, timestamp = raw.timestamp, "Failed to parse log entry: {}", e);
            return RecordOutcome::Malformed;
        }
    };

    let event_record_id = match envelope.event_record_id() {
        Ok(id) => id,
        Err(e) => {
            error!(stage = %PipelineStage::Decode, timestamp = raw.timestamp, "Skipping log entry: {}", e);
            return RecordOutcome::Malformed;
        }
    };

    if dedup.is_duplicate(event_record_id) {
        debug!(event_record_id, "Skipping duplicate log");
        return RecordOutcome::Duplicate;
    }

    let record = match parse_entry(&envelope) {
        Ok(record) => record,
        Err(e) => {
            error!(stage = %PipelineStage::Parse, event_record_id, "Skipping log entry: {}", e);
            return RecordOutcome::Malformed;
        }
    };

    match sink.insert(record).await {
        Ok(()) => RecordOutcome::Processed,
        Err(e) => {
            error!(stage = %PipelineStage::Load, event_record_id, "Error processing log entry: {}", e);
            RecordOutcome::Failed
        }
    }
}

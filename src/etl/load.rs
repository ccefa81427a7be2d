/// Load Module
///
/// The storage side of the pipeline. A [`Sink`] owns its transport retries:
/// when `insert` returns an error the record is already lost for this cycle
/// and the caller must not retry it.
use async_trait::async_trait;

use crate::error::Result;
use crate::models::NormalizedRecord;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Create the target table if it does not exist. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;

    /// Write a single record
    async fn insert(&self, record: NormalizedRecord) -> Result<()>;

    /// `true` when the sink answers its health endpoint. Never fails.
    async fn check_health(&self) -> bool;
}

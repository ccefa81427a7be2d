/// ETL Module
///
/// The stages a log record passes through:
/// - Extract: page through Loki's query_range API
/// - Dedup: drop records whose EventRecordID was already seen
/// - Transform: validate the envelope and parse the `Data` field
/// - Load: write normalized rows to the storage backend
pub mod dedup;
pub mod extract;
pub mod load;
pub mod parsers;
pub mod transform;

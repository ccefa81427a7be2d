/// Error Module
///
/// Error taxonomy shared by the source, sink and pipeline. Per-record errors
/// (`MalformedPayload`, `MissingField`, `SinkWrite`) are contained by the
/// pipeline; `Connectivity`, `Request` and `UnexpectedResponse` abort a single
/// cycle; `Setup` is fatal to the process.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upstream unreachable after the retry budget was exhausted
    #[error("failed to connect to {endpoint} after {attempts} attempts: {source}")]
    Connectivity {
        endpoint: String,
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// Non-retryable request failure (HTTP status or body decode)
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered, but not in the shape we expect
    #[error("unexpected response from query backend: {0}")]
    UnexpectedResponse(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("failed to write record {event_record_id} to sink: {message}")]
    SinkWrite { event_record_id: u64, message: String },

    #[error("failed to apply sink schema: {0}")]
    Schema(String),

    #[error("setup failed: {0}")]
    Setup(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::MalformedPayload(err.to_string())
    }
}

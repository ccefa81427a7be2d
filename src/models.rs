/// Data Models Module
///
/// This module defines the core data structures used throughout the application.
/// These models represent audit-log records as they come out of Loki, the
/// decoded event envelope, and the normalized row written to VictoriaLogs.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One `(timestamp, line)` pair from a Loki result stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Nanoseconds since the Unix epoch
    pub timestamp: i64,
    /// JSON-encoded [`LogEnvelope`]
    pub payload: String,
}

/// Free-text and identifier fields of an event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogFields {
    #[serde(rename = "Data")]
    pub data: Option<String>,
    #[serde(rename = "EventRecordID")]
    pub event_record_id: Option<u64>,
    #[serde(rename = "Message")]
    pub message: Option<String>,
    #[serde(rename = "ProcessName")]
    pub process_name: Option<String>,
    #[serde(rename = "UserID")]
    pub user_id: Option<String>,
    #[serde(rename = "Version")]
    pub version: Option<i64>,
}

/// Tag attributes. Only the ones forwarded to the sink are modelled; the rest
/// (Channel, Keywords, Level, host, ...) are ignored on decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogTags {
    #[serde(rename = "Computer")]
    pub computer: Option<String>,
    #[serde(rename = "EventID")]
    pub event_id: Option<String>,
    #[serde(rename = "Source")]
    pub source: Option<String>,
    pub environment: Option<String>,
    pub region: Option<String>,
}

/// Decoded Loki line payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEnvelope {
    #[serde(default)]
    pub fields: LogFields,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: LogTags,
    /// Epoch seconds
    pub timestamp: Option<i64>,
}

impl LogEnvelope {
    pub fn from_payload(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    /// The dedup key
    pub fn event_record_id(&self) -> Result<u64> {
        self.fields.event_record_id.ok_or(PipelineError::MissingField("EventRecordID"))
    }
}

/// Fields extracted from the free-text `Data` attribute. Every field is
/// independent and `None` when its pattern does not match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFields {
    pub error_code: Option<i32>,
    pub severity: Option<i32>,
    pub state: Option<i32>,
    pub start_time: Option<NaiveDateTime>,
    pub trace_type: Option<String>,
    pub event_class_desc: Option<String>,
    pub login_name: Option<String>,
    pub host_name: Option<String>,
    pub text_data: Option<String>,
    pub application_name: Option<String>,
    pub database_name: Option<String>,
    pub object_name: Option<String>,
    pub role_name: Option<String>,
}

/// Row written to the `audit_logs` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub timestamp: DateTime<Utc>,
    pub event_record_id: u64,
    #[serde(flatten)]
    pub parsed: ParsedFields,
    pub computer: String,
    pub event_id: String,
    pub source: String,
    pub environment: String,
    pub region: String,
}

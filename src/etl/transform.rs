/// Transform Module
///
/// Turns a decoded envelope into the row written to the sink.
use chrono::{DateTime, Utc};

use crate::error::{PipelineError, Result};
use crate::models::{LogEnvelope, NormalizedRecord};

use super::parsers::parse_data_field;

/// Build a [`NormalizedRecord`] from an envelope.
///
/// Fails with [`PipelineError::MissingField`] when `Data`, `timestamp`,
/// `EventRecordID` or any of the forwarded tags is absent.
pub fn parse_entry(envelope: &LogEnvelope) -> Result<NormalizedRecord> {
    let data = required(envelope.fields.data.as_deref(), "Data")?;
    let event_record_id = envelope.event_record_id()?;
    let epoch_secs = envelope.timestamp.ok_or(PipelineError::MissingField("timestamp"))?;

    let timestamp: DateTime<Utc> = DateTime::from_timestamp(epoch_secs, 0)
        .ok_or_else(|| PipelineError::MalformedPayload(format!("timestamp {} is out of range", epoch_secs)))?;

    let tags = &envelope.tags;

    Ok(NormalizedRecord {
        timestamp,
        event_record_id,
        parsed: parse_data_field(data),
        computer: required(tags.computer.as_deref(), "Computer")?.to_string(),
        event_id: required(tags.event_id.as_deref(), "EventID")?.to_string(),
        source: required(tags.source.as_deref(), "Source")?.to_string(),
        environment: required(tags.environment.as_deref(), "environment")?.to_string(),
        region: required(tags.region.as_deref(), "region")?.to_string(),
    })
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    value.ok_or(PipelineError::MissingField(name))
}

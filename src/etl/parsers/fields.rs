/// Audit Payload Field Parser
///
/// Extracts typed fields from the free-text `Data` attribute of a SQL Server
/// audit event. Each field is described by one row of [`FIELD_PATTERNS`]: a
/// single-capture-group regex and the slot it fills in [`ParsedFields`].
///
/// Parsing is total. A pattern that does not match, an integer that does not
/// fit, or a date that does not follow `MM/DD/YYYY HH:MM:SS` all leave the
/// field as `None`.
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

use crate::models::ParsedFields;

const START_TIME_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Where a captured value goes and how it is coerced
enum Slot {
    Int(fn(&mut ParsedFields) -> &mut Option<i32>),
    DateTime(fn(&mut ParsedFields) -> &mut Option<NaiveDateTime>),
    Text(fn(&mut ParsedFields) -> &mut Option<String>),
}

struct FieldPattern {
    name: &'static str,
    pattern: &'static str,
    slot: Slot,
}

const FIELD_PATTERNS: &[FieldPattern] = &[
    FieldPattern { name: "error_code", pattern: r"Error: (\d+)", slot: Slot::Int(|p| &mut p.error_code) },
    FieldPattern { name: "severity", pattern: r"Severity: (\d+)", slot: Slot::Int(|p| &mut p.severity) },
    FieldPattern { name: "state", pattern: r"State: (\d+)", slot: Slot::Int(|p| &mut p.state) },
    FieldPattern { name: "start_time", pattern: r"StartTime:([^\n]+)", slot: Slot::DateTime(|p| &mut p.start_time) },
    FieldPattern { name: "trace_type", pattern: r"TraceType:([^\n]+)", slot: Slot::Text(|p| &mut p.trace_type) },
    FieldPattern {
        name: "event_class_desc",
        pattern: r"EventClassDesc:([^\n]+)",
        slot: Slot::Text(|p| &mut p.event_class_desc),
    },
    FieldPattern { name: "login_name", pattern: r"LoginName:([^\n]+)", slot: Slot::Text(|p| &mut p.login_name) },
    FieldPattern { name: "host_name", pattern: r"HostName:([^\n]+)", slot: Slot::Text(|p| &mut p.host_name) },
    FieldPattern { name: "text_data", pattern: r"TextData:([^\n]+)", slot: Slot::Text(|p| &mut p.text_data) },
    FieldPattern {
        name: "application_name",
        pattern: r"ApplicationName:([^\n]+)",
        slot: Slot::Text(|p| &mut p.application_name),
    },
    FieldPattern {
        name: "database_name",
        pattern: r"DatabaseName:([^\n]+)",
        slot: Slot::Text(|p| &mut p.database_name),
    },
    FieldPattern { name: "object_name", pattern: r"ObjectName:([^\n]+)", slot: Slot::Text(|p| &mut p.object_name) },
    FieldPattern { name: "role_name", pattern: r"RoleName:([^\n]+)", slot: Slot::Text(|p| &mut p.role_name) },
];

static COMPILED_PATTERNS: LazyLock<Vec<(&'static FieldPattern, Regex)>> = LazyLock::new(|| {
    FIELD_PATTERNS
        .iter()
        .map(|field| (field, Regex::new(field.pattern).expect("hard-coded regular expression to be valid")))
        .collect()
});

/// Parse the `Data` attribute of an audit event
pub fn parse(data: &str) -> ParsedFields {
    let mut parsed = ParsedFields::default();

    for (field, regex) in COMPILED_PATTERNS.iter() {
        let Some(value) = regex.captures(data).and_then(|caps| caps.get(1)).map(|m| m.as_str().trim()) else {
            continue;
        };

        match field.slot {
            Slot::Int(slot) => {
                *slot(&mut parsed) = value.parse().ok();
            }
            Slot::DateTime(slot) => {
                *slot(&mut parsed) = NaiveDateTime::parse_from_str(value, START_TIME_FORMAT).ok();
            }
            Slot::Text(slot) => {
                *slot(&mut parsed) = Some(value.to_string());
            }
        }

        tracing::trace!(field = field.name, value, "matched payload field");
    }

    parsed
}

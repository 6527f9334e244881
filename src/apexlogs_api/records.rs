//! Tooling API records and the SOQL used to read them.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Timestamp layout used by the platform for `DateTime` fields.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f%z";

/// Trace flags are only managed for developer logs.
pub const DEVELOPER_LOG: &str = "DEVELOPER_LOG";

pub const APEX_LOG: &str = "ApexLog";
pub const DEBUG_LEVEL: &str = "DebugLevel";
pub const TRACE_FLAG: &str = "TraceFlag";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse<T> {
    #[serde(default = "Vec::new")]
    pub records: Vec<T>,
    #[serde(default, rename = "totalSize")]
    pub total_size: usize,
    #[serde(default)]
    pub done: bool,
}

/// Result body of an sobject create call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "lenient_errors")]
    pub errors: Vec<String>,
}

/// One row of the log list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApexLog {
    pub id: String,
    pub application: Option<String>,
    pub location: Option<String>,
    pub log_user_id: Option<String>,
    pub operation: String,
    pub request: Option<String>,
    pub request_identifier: Option<String>,
    pub status: String,
    pub start_time: String,
    pub duration_milliseconds: u64,
    pub log_length: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DebugLevel {
    pub id: String,
    pub developer_name: String,
    pub master_label: String,
    pub apex_code: String,
    pub apex_profiling: String,
    pub callout: String,
    pub database: String,
    pub system: String,
    pub validation: String,
    pub visualforce: String,
    pub workflow: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TraceFlag {
    pub id: String,
    pub debug_level_id: String,
    pub expiration_date: String,
    pub traced_entity_id: String,
    pub log_type: String,
}

pub fn select_apex_logs(limit: usize) -> String {
    format!(
        "SELECT Id, Application, Location, LogUserId, Operation, Request, RequestIdentifier, \
         Status, StartTime, DurationMilliseconds, LogLength \
         FROM ApexLog ORDER BY StartTime DESC LIMIT {limit}"
    )
}

pub fn select_debug_level(developer_name: &str) -> String {
    format!(
        "SELECT Id, ApexCode, ApexProfiling, Callout, Database, DeveloperName, MasterLabel, \
         System, Validation, Visualforce, Workflow \
         FROM DebugLevel WHERE DeveloperName = '{}' LIMIT 1",
        escape_soql(developer_name)
    )
}

pub fn select_trace_flag(traced_entity_id: &str) -> String {
    format!(
        "SELECT Id, DebugLevelId, ExpirationDate, TracedEntityId, LogType \
         FROM TraceFlag WHERE TracedEntityId = '{}' AND LogType = '{DEVELOPER_LOG}' LIMIT 1",
        escape_soql(traced_entity_id)
    )
}

fn escape_soql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Payload for a new debug level with developer console verbosity.
pub fn new_debug_level_payload(developer_name: &str) -> Value {
    json!({
        "DeveloperName": developer_name,
        "MasterLabel": developer_name,
        "ApexCode": "FINEST",
        "ApexProfiling": "INFO",
        "Callout": "INFO",
        "Database": "INFO",
        "System": "DEBUG",
        "Validation": "INFO",
        "Visualforce": "INFO",
        "Workflow": "INFO",
    })
}

pub fn parse_datetime(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let value = value.trim();
    match value.strip_suffix('Z') {
        Some(utc) => DateTime::parse_from_str(&format!("{utc}+0000"), DATETIME_FORMAT),
        None => DateTime::parse_from_str(value, DATETIME_FORMAT),
    }
}

pub fn format_datetime(value: DateTime<Utc>) -> String {
    // `+0000` rather than `Z` keeps the value inside DATETIME_FORMAT.
    let base = value.to_rfc3339_opts(SecondsFormat::Millis, true);
    match base.strip_suffix('Z') {
        Some(stamp) => format!("{stamp}+0000"),
        None => base,
    }
}

fn lenient_errors<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Array(items)) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::String(text) => text,
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map).to_string()),
            other => other.to_string(),
        })
        .collect())
}

//! Remote access to the Salesforce Tooling API.
//!
//! The rest of the crate talks to the org through [`ToolingApi`]; [`HttpToolingApi`] is the
//! reqwest-backed implementation used at runtime. The [`Session`] describing the
//! authenticated org comes from the `sf` command.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

mod client;
mod records;
mod session;

pub use client::HttpToolingApi;
pub use records::{
    format_datetime, new_debug_level_payload, parse_datetime, select_apex_logs,
    select_debug_level, select_trace_flag, ApexLog, CreateResponse, DebugLevel, QueryResponse,
    TraceFlag, APEX_LOG, DATETIME_FORMAT, DEBUG_LEVEL, DEVELOPER_LOG, TRACE_FLAG,
};
pub use session::{discover_session, parse_user_display, Session, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid instance url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Record-oriented operations against the Tooling API.
#[async_trait]
pub trait ToolingApi: Send + Sync {
    async fn query(&self, soql: &str) -> Result<QueryResponse<Value>, ApiError>;

    async fn create(&self, sobject: &str, payload: Value) -> Result<CreateResponse, ApiError>;

    async fn update(&self, sobject: &str, id: &str, payload: Value) -> Result<(), ApiError>;

    async fn fetch_body(&self, sobject: &str, id: &str) -> Result<String, ApiError>;
}

/// Runs `soql` and decodes every record into `T`.
pub async fn query_records<T, A>(api: &A, soql: &str) -> Result<QueryResponse<T>, ApiError>
where
    T: DeserializeOwned,
    A: ToolingApi + ?Sized,
{
    let raw = api.query(soql).await?;
    let records = raw
        .records
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()?;
    Ok(QueryResponse { records, total_size: raw.total_size, done: raw.done })
}

pub async fn fetch_apex_logs<A>(api: &A, limit: usize) -> Result<Vec<ApexLog>, ApiError>
where
    A: ToolingApi + ?Sized,
{
    let response = query_records::<ApexLog, _>(api, &select_apex_logs(limit)).await?;
    Ok(response.records)
}

pub async fn fetch_apex_log_body<A>(api: &A, id: &str) -> Result<String, ApiError>
where
    A: ToolingApi + ?Sized,
{
    api.fetch_body(APEX_LOG, id).await
}

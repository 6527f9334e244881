//! Debug level bootstrap and trace flag keepalive.
//!
//! Logs are only captured while a `DEVELOPER_LOG` trace flag for the current user is active.
//! [`bootstrap`] makes sure the debug level and trace flag exist when the session starts;
//! [`spawn_keepalive`] then re-checks the flag every [`KEEPALIVE_PERIOD`] and pushes its
//! expiration forward before it lapses.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::apexlogs_api::{
    format_datetime, new_debug_level_payload, parse_datetime, query_records, select_debug_level,
    select_trace_flag, ApiError, DebugLevel, ToolingApi, TraceFlag, DEBUG_LEVEL, DEVELOPER_LOG,
    TRACE_FLAG,
};

pub const DEFAULT_DEBUG_LEVEL: &str = "SFDC_DevConsole";
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(15 * 60);
const TRACE_FLAG_TTL_MINUTES: i64 = 30;
const RENEW_WITHIN_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFlagOutcome {
    Created,
    Renewed,
    Valid,
}

impl TraceFlagOutcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Renewed => "renewed",
            Self::Valid => "active",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceFlagError {
    #[error("trace flag of type debug log not found")]
    NotFound,
    #[error("error querying trace flag record: {0}")]
    Query(#[source] ApiError),
    #[error("unexpected format found for trace flag expiration date: {value}")]
    InvalidExpiration { value: String },
    #[error("error sending new trace flag request: {0}")]
    Create(#[source] ApiError),
    #[error("trace flag creation rejected: {}", .errors.join(", "))]
    Rejected { errors: Vec<String> },
    #[error("error updating trace flag {id}: {source}")]
    Update { id: String, source: ApiError },
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("error querying debug level {name}: {source}")]
    DebugLevelQuery { name: String, source: ApiError },
    #[error("error creating debug level {name}: {source}")]
    DebugLevelCreate { name: String, source: ApiError },
    #[error("debug level {name} creation rejected: {}", .errors.join(", "))]
    DebugLevelRejected { name: String, errors: Vec<String> },
    #[error(transparent)]
    TraceFlag(#[from] TraceFlagError),
}

/// Result of a completed bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub debug_level_id: String,
    pub trace_flag: TraceFlagOutcome,
}

fn minutes(value: i64) -> chrono::Duration {
    chrono::Duration::minutes(value)
}

/// Looks up the debug level by developer name, creating it when missing.
pub async fn ensure_debug_level<A>(api: &A, name: &str) -> Result<String, BootstrapError>
where
    A: ToolingApi + ?Sized,
{
    let existing = query_records::<DebugLevel, _>(api, &select_debug_level(name))
        .await
        .map_err(|source| BootstrapError::DebugLevelQuery { name: name.to_string(), source })?;
    if let Some(level) = existing.records.into_iter().next() {
        debug!(id = %level.id, name, "using existing debug level");
        return Ok(level.id);
    }

    let created = api
        .create(DEBUG_LEVEL, new_debug_level_payload(name))
        .await
        .map_err(|source| BootstrapError::DebugLevelCreate { name: name.to_string(), source })?;
    if !created.success {
        return Err(BootstrapError::DebugLevelRejected {
            name: name.to_string(),
            errors: created.errors,
        });
    }
    info!(id = %created.id, name, "created debug level");
    Ok(created.id)
}

/// Inspects the user's developer log trace flag and renews it when it expires soon.
///
/// A missing flag is reported as [`TraceFlagError::NotFound`] so callers can create one.
pub async fn refresh_trace_flag<A>(
    api: &A,
    user_id: &str,
    now: DateTime<Utc>,
) -> Result<TraceFlagOutcome, TraceFlagError>
where
    A: ToolingApi + ?Sized,
{
    let response = query_records::<TraceFlag, _>(api, &select_trace_flag(user_id))
        .await
        .map_err(TraceFlagError::Query)?;
    let Some(flag) = response.records.into_iter().next() else {
        return Err(TraceFlagError::NotFound);
    };

    let expiration = parse_datetime(&flag.expiration_date).map_err(|_| {
        TraceFlagError::InvalidExpiration { value: flag.expiration_date.clone() }
    })?;
    if expiration.with_timezone(&Utc) >= now + minutes(RENEW_WITHIN_MINUTES) {
        return Ok(TraceFlagOutcome::Valid);
    }

    let payload = json!({
        "StartDate": format_datetime(now),
        "ExpirationDate": format_datetime(now + minutes(TRACE_FLAG_TTL_MINUTES)),
    });
    api.update(TRACE_FLAG, &flag.id, payload)
        .await
        .map_err(|source| TraceFlagError::Update { id: flag.id.clone(), source })?;
    info!(id = %flag.id, "renewed trace flag");
    Ok(TraceFlagOutcome::Renewed)
}

pub async fn create_trace_flag<A>(
    api: &A,
    user_id: &str,
    debug_level_id: &str,
    now: DateTime<Utc>,
) -> Result<String, TraceFlagError>
where
    A: ToolingApi + ?Sized,
{
    let payload = json!({
        "TracedEntityId": user_id,
        "DebugLevelId": debug_level_id,
        "LogType": DEVELOPER_LOG,
        "StartDate": format_datetime(now),
        "ExpirationDate": format_datetime(now + minutes(TRACE_FLAG_TTL_MINUTES)),
    });
    let created = api.create(TRACE_FLAG, payload).await.map_err(TraceFlagError::Create)?;
    if !created.success {
        return Err(TraceFlagError::Rejected { errors: created.errors });
    }
    info!(id = %created.id, user_id, "created trace flag");
    Ok(created.id)
}

/// Makes sure an unexpired trace flag exists for `user_id`.
pub async fn ensure_trace_flag<A>(
    api: &A,
    user_id: &str,
    debug_level_id: &str,
    now: DateTime<Utc>,
) -> Result<TraceFlagOutcome, TraceFlagError>
where
    A: ToolingApi + ?Sized,
{
    match refresh_trace_flag(api, user_id, now).await {
        Err(TraceFlagError::NotFound) => {
            create_trace_flag(api, user_id, debug_level_id, now).await?;
            Ok(TraceFlagOutcome::Created)
        }
        other => other,
    }
}

/// Debug level first, then the trace flag that references it.
pub async fn bootstrap<A>(
    api: &A,
    user_id: &str,
    debug_level_name: &str,
    now: DateTime<Utc>,
) -> Result<Bootstrap, BootstrapError>
where
    A: ToolingApi + ?Sized,
{
    let debug_level_id = ensure_debug_level(api, debug_level_name).await?;
    let trace_flag = ensure_trace_flag(api, user_id, &debug_level_id, now).await?;
    Ok(Bootstrap { debug_level_id, trace_flag })
}

/// Owner of a running keepalive task.
///
/// Dropping the handle stops the task as well.
#[derive(Debug)]
pub struct KeepaliveHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl KeepaliveHandle {
    /// Stops future renewals. Safe to call more than once.
    pub fn cancel(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.stop.borrow()
    }

    /// Cancels and waits for the task to exit.
    pub async fn shutdown(self) {
        self.cancel();
        let _ = self.task.await;
    }
}

/// Re-runs [`ensure_trace_flag`] every `period` until cancelled.
///
/// `report` receives each check's result on the keepalive task.
pub fn spawn_keepalive<C, R>(
    api: Arc<dyn ToolingApi>,
    user_id: String,
    debug_level_id: String,
    period: Duration,
    clock: C,
    report: R,
) -> KeepaliveHandle
where
    C: Fn() -> DateTime<Utc> + Send + 'static,
    R: Fn(Result<TraceFlagOutcome, TraceFlagError>) + Send + 'static,
{
    let (stop, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = tokio::time::sleep(period) => {}
            }
            if *stop_rx.borrow() {
                break;
            }
            let result = ensure_trace_flag(api.as_ref(), &user_id, &debug_level_id, clock()).await;
            match &result {
                Ok(outcome) => debug!(outcome = outcome.label(), "keepalive check"),
                Err(error) => warn!(%error, "keepalive check failed"),
            }
            report(result);
        }
        debug!("keepalive stopped");
    });
    KeepaliveHandle { stop, task }
}

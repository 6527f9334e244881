//! Discovery of the authenticated org through the `sf` CLI.

use serde::Deserialize;
use tokio::process::Command;
use tracing::info;

/// Connection details for one authenticated org user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub instance_url: String,
    pub api_version: String,
    pub user_id: String,
    pub username: String,
    pub alias: Option<String>,
}

impl Session {
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().filter(|alias| !alias.is_empty()).unwrap_or(&self.username)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid sf command line: {0}")]
    InvalidCommand(String),
    #[error("failed to run `{command}`: {source}")]
    Spawn { command: String, source: std::io::Error },
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed { command: String, status: String, stderr: String },
    #[error("unexpected sf output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("sf reported status {status}: {message}")]
    Rejected { status: i64, message: String },
    #[error("sf output is missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    message: Option<String>,
    result: Option<UserDisplay>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserDisplay {
    access_token: Option<String>,
    instance_url: Option<String>,
    id: Option<String>,
    username: Option<String>,
    alias: Option<String>,
}

/// Runs `<sf> org display user --json` and builds the session from its output.
pub async fn discover_session(
    sf_command: &str,
    target_org: Option<&str>,
    api_version: &str,
) -> Result<Session, SessionError> {
    let mut parts =
        shlex::split(sf_command).ok_or_else(|| SessionError::InvalidCommand(sf_command.into()))?;
    if parts.is_empty() {
        return Err(SessionError::InvalidCommand(sf_command.into()));
    }
    let program = parts.remove(0);
    let mut command = Command::new(&program);
    command.args(&parts).args(["org", "display", "user", "--json"]);
    if let Some(target) = target_org {
        command.args(["--target-org", target]);
    }

    let output = command
        .output()
        .await
        .map_err(|source| SessionError::Spawn { command: sf_command.to_string(), source })?;

    // sf prints its JSON error envelope on stdout even when it fails.
    if !output.status.success() && output.stdout.is_empty() {
        return Err(SessionError::Failed {
            command: sf_command.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let session = parse_user_display(&output.stdout, api_version)?;
    info!(user = %session.username, instance = %session.instance_url, "discovered org session");
    Ok(session)
}

pub fn parse_user_display(stdout: &[u8], api_version: &str) -> Result<Session, SessionError> {
    let response: CommandResponse = serde_json::from_slice(stdout)?;
    if response.status != 0 {
        return Err(SessionError::Rejected {
            status: response.status,
            message: response.message.unwrap_or_default(),
        });
    }
    let user = response.result.ok_or(SessionError::MissingField("result"))?;
    Ok(Session {
        access_token: user.access_token.ok_or(SessionError::MissingField("accessToken"))?,
        instance_url: user.instance_url.ok_or(SessionError::MissingField("instanceUrl"))?,
        api_version: api_version.to_string(),
        user_id: user.id.ok_or(SessionError::MissingField("id"))?,
        username: user.username.unwrap_or_default(),
        alias: user.alias,
    })
}

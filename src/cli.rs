use std::{
    collections::BTreeMap,
    env,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    time::{Duration, Instant},
};

use clap::Parser;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::apexlogs_api::{discover_session, HttpToolingApi, Session, ToolingApi};
use crate::apexlogs_trace::{DEFAULT_DEBUG_LEVEL, KEEPALIVE_PERIOD};
use crate::apexlogs_tui::{App, AppEvent, KeyBindings, KeyParseError, TuiConfig, TuiError};
use crate::apexlogs_worker::{Worker, WorkerSettings};

const CONFIG_FILE_NAME: &str = "apexlogs.json";
const DEFAULT_SF_COMMAND: &str = "sf";
const DEFAULT_API_VERSION: &str = "61.0";
const DEFAULT_LOG_LIMIT: usize = 100;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const TUI_TICK_MS: u64 = 50;
const SPINNER_TICK_MS: u64 = 100;

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "apexlogs", version, about = "Browse Salesforce Apex logs in the terminal")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Command used to invoke the Salesforce CLI.
    #[arg(long = "sf")]
    sf_command: Option<String>,
    /// Org alias or username passed to `sf --target-org`.
    #[arg(long, short = 'o')]
    target_org: Option<String>,
    #[arg(long)]
    api_version: Option<String>,
    #[arg(long)]
    debug_level: Option<String>,
    /// Number of apex logs to list.
    #[arg(long)]
    limit: Option<usize>,
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Config {
    sf_command: String,
    target_org: Option<String>,
    api_version: String,
    debug_level: String,
    log_limit: usize,
    request_timeout_ms: u64,
    log_file: Option<PathBuf>,
    keys: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Clone)]
struct PartialConfig {
    sf_command: Option<String>,
    target_org: Option<String>,
    api_version: Option<String>,
    debug_level: Option<String>,
    log_limit: Option<usize>,
    request_timeout_ms: Option<u64>,
    log_file: Option<PathBuf>,
    keys: Option<BTreeMap<String, Vec<String>>>,
}

impl PartialConfig {
    fn merge(&mut self, other: PartialConfig) {
        if other.sf_command.is_some() {
            self.sf_command = other.sf_command;
        }
        if other.target_org.is_some() {
            self.target_org = other.target_org;
        }
        if other.api_version.is_some() {
            self.api_version = other.api_version;
        }
        if other.debug_level.is_some() {
            self.debug_level = other.debug_level;
        }
        if other.log_limit.is_some() {
            self.log_limit = other.log_limit;
        }
        if other.request_timeout_ms.is_some() {
            self.request_timeout_ms = other.request_timeout_ms;
        }
        if other.log_file.is_some() {
            self.log_file = other.log_file;
        }
        if other.keys.is_some() {
            self.keys = other.keys;
        }
    }
}

impl Config {
    fn from_partial(partial: PartialConfig) -> Self {
        Self {
            sf_command: partial.sf_command.unwrap_or_else(|| DEFAULT_SF_COMMAND.to_string()),
            target_org: partial.target_org,
            api_version: partial.api_version.unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            debug_level: partial.debug_level.unwrap_or_else(|| DEFAULT_DEBUG_LEVEL.to_string()),
            log_limit: partial.log_limit.unwrap_or(DEFAULT_LOG_LIMIT),
            request_timeout_ms: partial.request_timeout_ms.unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            log_file: partial.log_file,
            keys: partial.keys.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct FileConfig {
    #[serde(alias = "sf")]
    sf_command: Option<String>,
    #[serde(alias = "targetOrg", alias = "target-org")]
    target_org: Option<String>,
    #[serde(alias = "apiVersion")]
    api_version: Option<String>,
    #[serde(alias = "debugLevel")]
    debug_level: Option<String>,
    #[serde(alias = "logLimit", alias = "limit")]
    log_limit: Option<usize>,
    #[serde(alias = "requestTimeoutMs")]
    request_timeout_ms: Option<u64>,
    #[serde(alias = "logFile")]
    log_file: Option<PathBuf>,
    keys: Option<BTreeMap<String, Vec<String>>>,
}

impl FileConfig {
    fn into_partial(self) -> PartialConfig {
        PartialConfig {
            sf_command: self.sf_command,
            target_org: self.target_org,
            api_version: self.api_version,
            debug_level: self.debug_level,
            log_limit: self.log_limit,
            request_timeout_ms: self.request_timeout_ms,
            log_file: self.log_file,
            keys: self.keys,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("config file not found: {path}")]
    MissingConfig { path: PathBuf },
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
    #[error("invalid {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },
    #[error("invalid key binding: {0}")]
    InvalidKeys(#[from] KeyParseError),
}

fn cli_overrides(cli: &Cli) -> PartialConfig {
    PartialConfig {
        sf_command: cli.sf_command.clone(),
        target_org: cli.target_org.clone(),
        api_version: cli.api_version.clone(),
        debug_level: cli.debug_level.clone(),
        log_limit: cli.limit,
        log_file: cli.log_file.clone(),
        ..PartialConfig::default()
    }
}

fn env_overrides(env: &BTreeMap<String, String>) -> Result<PartialConfig, ConfigError> {
    let non_empty = |name: &str| env.get(name).filter(|value| !value.trim().is_empty()).cloned();
    let mut partial = PartialConfig {
        sf_command: non_empty("APEXLOGS_SF"),
        target_org: non_empty("APEXLOGS_TARGET_ORG"),
        api_version: non_empty("APEXLOGS_API_VERSION"),
        debug_level: non_empty("APEXLOGS_DEBUG_LEVEL"),
        log_file: non_empty("APEXLOGS_LOG_FILE").map(PathBuf::from),
        ..PartialConfig::default()
    };
    if let Some(value) = env.get("APEXLOGS_LOG_LIMIT") {
        partial.log_limit = Some(parse_usize("APEXLOGS_LOG_LIMIT", value)?);
    }
    if let Some(value) = env.get("APEXLOGS_REQUEST_TIMEOUT_MS") {
        partial.request_timeout_ms = Some(parse_u64("APEXLOGS_REQUEST_TIMEOUT_MS", value)?);
    }
    Ok(partial)
}

fn parse_usize(name: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidEnv { name: name.to_string(), value: value.to_string() })
}

fn parse_u64(name: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnv { name: name.to_string(), value: value.to_string() })
}

fn load_config_file(path: &Path) -> Result<PartialConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    let parsed: FileConfig = serde_json::from_str(&contents)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
    Ok(parsed.into_partial())
}

fn find_config_path(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            break;
        }
    }
    None
}

fn resolve_config(
    cli: &Cli,
    cwd: &Path,
    env: &BTreeMap<String, String>,
) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let mut partial = PartialConfig::default();

    let config_path = if let Some(path) = &cli.config {
        if !path.is_file() {
            return Err(ConfigError::MissingConfig { path: path.clone() });
        }
        Some(path.clone())
    } else {
        find_config_path(cwd)
    };

    if let Some(path) = config_path.as_ref() {
        let file_partial = load_config_file(path)?;
        partial.merge(file_partial);
    }

    let env_partial = env_overrides(env)?;
    partial.merge(env_partial);

    let cli_partial = cli_overrides(cli);
    partial.merge(cli_partial);

    let mut config = Config::from_partial(partial);
    if config.log_limit == 0 {
        return Err(ConfigError::InvalidValue {
            name: "log_limit",
            reason: "must be at least 1".to_string(),
        });
    }
    if config.sf_command.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            name: "sf_command",
            reason: "must not be empty".to_string(),
        });
    }
    if config.log_file.is_none() {
        config.log_file = Some(default_log_path(env));
    }
    Ok((config, config_path))
}

fn default_log_path(env: &BTreeMap<String, String>) -> PathBuf {
    let state_dir = env
        .get("XDG_STATE_HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(|| env.get("HOME").map(|home| Path::new(home).join(".local").join("state")))
        .unwrap_or_else(env::temp_dir);
    state_dir.join("apexlogs").join("apexlogs.log")
}

fn init_logging(path: &Path) -> Result<(), DynError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()?;
    Ok(())
}

pub async fn run() -> Result<(), DynError> {
    let cli = Cli::parse();
    let cwd = env::current_dir()?;
    let env_map: BTreeMap<String, String> = env::vars().collect();
    let (config, config_path) = resolve_config(&cli, &cwd, &env_map)?;
    let keys = KeyBindings::with_overrides(&config.keys).map_err(ConfigError::from)?;

    if let Some(log_file) = &config.log_file {
        init_logging(log_file)?;
    }

    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded config file");
    } else {
        info!("no {CONFIG_FILE_NAME} found, using defaults and env/cli overrides");
    }
    info!(
        sf_command = %config.sf_command,
        target_org = ?config.target_org,
        api_version = %config.api_version,
        debug_level = %config.debug_level,
        log_limit = config.log_limit,
        request_timeout_ms = config.request_timeout_ms,
        custom_keys = config.keys.len(),
        "resolved config"
    );

    let session =
        discover_session(&config.sf_command, config.target_org.as_deref(), &config.api_version)
            .await?;
    let api: Arc<dyn ToolingApi> = Arc::new(HttpToolingApi::new(
        &session,
        Duration::from_millis(config.request_timeout_ms),
    )?);
    let session = Arc::new(session);

    let tui_config = TuiConfig {
        keys,
        org_label: session.display_name().to_string(),
        username: session.username.clone(),
    };
    let settings = WorkerSettings {
        debug_level: config.debug_level.clone(),
        log_limit: config.log_limit,
        keepalive_period: KEEPALIVE_PERIOD,
    };

    if let Some(message) = run_tui(tui_config, api, session, settings).await? {
        warn!(%message, "session ended with a startup failure");
        return Err(message.into());
    }
    info!("session ended");
    Ok(())
}

async fn run_tui(
    config: TuiConfig,
    api: Arc<dyn ToolingApi>,
    session: Arc<Session>,
    settings: WorkerSettings,
) -> Result<Option<String>, DynError> {
    let (event_tx, event_rx) = mpsc::channel::<AppEvent>();
    let worker = Worker::new(api, session, settings, event_tx, tokio::runtime::Handle::current());
    let app = App::new(config);

    let fatal = tokio::task::spawn_blocking(move || run_tui_loop(app, worker, event_rx)).await??;
    Ok(fatal)
}

/// Drives the app until it quits. Returns the startup failure that ended it, if any.
fn run_tui_loop(
    mut app: App,
    mut worker: Worker,
    event_rx: mpsc::Receiver<AppEvent>,
) -> Result<Option<String>, TuiError> {
    let _guard = TerminalGuard::enter()?;
    let stdout = io::stdout();
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    terminal.hide_cursor()?;

    let size = terminal.size()?;
    app.handle(AppEvent::Resize { width: size.width, height: size.height });
    let effects = app.start();
    worker.dispatch_all(effects);

    let spinner_tick = Duration::from_millis(SPINNER_TICK_MS);
    let mut last_tick = Instant::now();

    while !app.should_quit() {
        while let Ok(event) = event_rx.try_recv() {
            let effects = app.handle(event);
            worker.dispatch_all(effects);
            if app.should_quit() {
                break;
            }
        }

        if app.should_quit() {
            break;
        }

        terminal.draw(|frame| {
            app.render(frame);
        })?;

        if event::poll(Duration::from_millis(TUI_TICK_MS))? {
            let event = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
                Event::Resize(width, height) => Some(AppEvent::Resize { width, height }),
                _ => None,
            };
            if let Some(event) = event {
                let effects = app.handle(event);
                worker.dispatch_all(effects);
            }
        }

        if last_tick.elapsed() >= spinner_tick {
            app.handle(AppEvent::Tick);
            last_tick = Instant::now();
        }
    }

    worker.stop_keepalive();
    terminal.show_cursor()?;
    Ok(app.fatal_error().map(str::to_string))
}

struct TerminalGuard;

impl TerminalGuard {
    fn enter() -> Result<Self, TuiError> {
        enable_raw_mode()?;
        if let Err(error) = execute!(io::stdout(), EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(error.into());
        }
        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
    }
}

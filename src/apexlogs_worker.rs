//! Runs the app's effects as tokio tasks and reports back through a channel.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::apexlogs_api::{fetch_apex_log_body, fetch_apex_logs, Session, ToolingApi};
use crate::apexlogs_trace::{bootstrap, spawn_keepalive, KeepaliveHandle, KEEPALIVE_PERIOD};
use crate::apexlogs_tui::{AppEvent, Effect};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub debug_level: String,
    pub log_limit: usize,
    pub keepalive_period: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            debug_level: crate::apexlogs_trace::DEFAULT_DEBUG_LEVEL.to_string(),
            log_limit: 100,
            keepalive_period: KEEPALIVE_PERIOD,
        }
    }
}

pub struct Worker {
    api: Arc<dyn ToolingApi>,
    session: Arc<Session>,
    settings: WorkerSettings,
    events: Sender<AppEvent>,
    runtime: Handle,
    keepalive: Option<KeepaliveHandle>,
}

impl Worker {
    pub fn new(
        api: Arc<dyn ToolingApi>,
        session: Arc<Session>,
        settings: WorkerSettings,
        events: Sender<AppEvent>,
        runtime: Handle,
    ) -> Self {
        Self { api, session, settings, events, runtime, keepalive: None }
    }

    pub fn dispatch_all(&mut self, effects: impl IntoIterator<Item = Effect>) {
        for effect in effects {
            self.dispatch(effect);
        }
    }

    pub fn dispatch(&mut self, effect: Effect) {
        debug!(?effect, "dispatching effect");
        match effect {
            Effect::Bootstrap => {
                let api = self.api.clone();
                let session = self.session.clone();
                let debug_level = self.settings.debug_level.clone();
                self.spawn(async move {
                    let result =
                        bootstrap(api.as_ref(), &session.user_id, &debug_level, Utc::now()).await;
                    AppEvent::Bootstrapped(result.map_err(|error| error.to_string()))
                });
            }
            Effect::StartKeepalive { debug_level_id } => {
                if self.keepalive.is_some() {
                    debug!("keepalive already running");
                    return;
                }
                let events = self.events.clone();
                let _guard = self.runtime.enter();
                let handle = spawn_keepalive(
                    self.api.clone(),
                    self.session.user_id.clone(),
                    debug_level_id,
                    self.settings.keepalive_period,
                    Utc::now,
                    move |result| {
                        let event = AppEvent::Keepalive {
                            checked_at: Utc::now(),
                            result: result.map_err(|error| error.to_string()),
                        };
                        if events.send(event).is_err() {
                            debug!("event loop gone, dropping keepalive result");
                        }
                    },
                );
                info!(period_secs = self.settings.keepalive_period.as_secs(), "keepalive armed");
                self.keepalive = Some(handle);
            }
            Effect::FetchLogs { generation } => {
                let api = self.api.clone();
                let limit = self.settings.log_limit;
                self.spawn(async move {
                    let result = fetch_apex_logs(api.as_ref(), limit).await;
                    AppEvent::LogsLoaded { generation, result: result.map_err(|error| error.to_string()) }
                });
            }
            Effect::FetchBody { generation, log_id } => {
                let api = self.api.clone();
                self.spawn(async move {
                    let result = fetch_apex_log_body(api.as_ref(), &log_id).await;
                    AppEvent::BodyLoaded {
                        generation,
                        log_id,
                        result: result.map_err(|error| error.to_string()),
                    }
                });
            }
            Effect::StopKeepalive => self.stop_keepalive(),
        }
    }

    /// Cancels the keepalive task if one is running. Safe to call repeatedly.
    pub fn stop_keepalive(&mut self) {
        if let Some(handle) = self.keepalive.take() {
            handle.cancel();
            info!("keepalive stopped");
        }
    }

    pub fn keepalive_running(&self) -> bool {
        self.keepalive.as_ref().is_some_and(|handle| !handle.is_cancelled())
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = AppEvent> + Send + 'static,
    {
        let events = self.events.clone();
        self.runtime.spawn(async move {
            let event = task.await;
            if events.send(event).is_err() {
                debug!("event loop gone, dropping result");
            }
        });
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop_keepalive();
    }
}

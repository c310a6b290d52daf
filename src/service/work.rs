//! Periodic work invoked by the control loop on every tick.

use tokio::task::JoinHandle;

use super::config::HttpConfig;
use crate::eventlog::EventLog;
use crate::http;

/// Work callback invoked once per dispatched tick.
///
/// Must not block: long-running work is handed off to a spawned task.
pub trait Work {
    fn on_tick(&mut self);
}

impl<F: FnMut()> Work for F {
    fn on_tick(&mut self) {
        self()
    }
}

/// Latch that lets one-time setup run exactly once.
#[derive(Debug, Default)]
pub struct FirstRunGuard {
    done: bool,
}

impl FirstRunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time only.
    pub fn claim(&mut self) -> bool {
        !std::mem::replace(&mut self.done, true)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Starts the HTTP server on the first tick; later ticks are no-ops.
///
/// The server task is not supervised: its failures are logged by the task
/// itself and never reach the control loop.
pub struct HttpWork {
    config: HttpConfig,
    events: EventLog,
    guard: FirstRunGuard,
    server: Option<JoinHandle<()>>,
}

impl HttpWork {
    pub fn new(config: HttpConfig, events: EventLog) -> Self {
        Self {
            config,
            events,
            guard: FirstRunGuard::new(),
            server: None,
        }
    }

    /// Whether the server task has been spawned.
    pub fn started(&self) -> bool {
        self.server.is_some()
    }
}

impl Work for HttpWork {
    fn on_tick(&mut self) {
        if !self.guard.claim() {
            return;
        }

        self.events.info("Start HTTP Server");

        let config = self.config.clone();
        let events = self.events.clone();
        self.server = Some(tokio::spawn(async move {
            if let Err(e) = http::serve(config).await {
                events.error(format!("HTTP server failed: {}", e));
            }
        }));
    }
}

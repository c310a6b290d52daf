//! One-shot administrative operations against the service manager.
//!
//! Install, remove, start and control-and-await run from the command line,
//! out-of-band from the running service. The service manager and the event
//! log source registry sit behind traits so the operations can be exercised
//! without the Windows SCM.

#[cfg(windows)]
pub mod scm;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::eventlog::EventLog;
use crate::service::ServiceState;
use crate::{Result, WebSvcError};

/// Arguments passed with a manual start.
pub const MANUAL_START_ARGS: [&str; 2] = ["is", "manual-started"];

/// Arguments registered with the service for automatic starts.
pub const AUTO_START_ARGS: [&str; 2] = ["is", "auto-started"];

/// Controls the administrative CLI can send to a running service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminControl {
    Stop,
    Pause,
    Continue,
}

/// Registration details for a new service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub display_name: String,
    pub executable: PathBuf,
    pub arguments: Vec<String>,
}

/// Connection to the service manager.
pub trait ServiceManager {
    type Service: ManagedService;

    /// Open an existing service; fails when it is not registered.
    fn open_service(&self, name: &str) -> Result<Self::Service>;

    /// Register a new auto-start service.
    fn create_service(&self, spec: &ServiceSpec) -> Result<Self::Service>;
}

/// Handle to one registered service.
pub trait ManagedService {
    fn start(&self, arguments: &[&str]) -> Result<()>;

    /// Send a control and return the state reported in response.
    fn control(&self, control: AdminControl) -> Result<ServiceState>;

    fn query_state(&self) -> Result<ServiceState>;

    fn delete(&self) -> Result<()>;
}

/// Registration of the event log source the service writes to.
pub trait EventSourceRegistry {
    fn install(&self, source: &str) -> Result<()>;
    fn remove(&self, source: &str) -> Result<()>;
}

/// Polling cadence and deadline for control-and-await.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AwaitPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for AwaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Administrative controller for a single named service.
pub struct AdminController<M, E> {
    manager: M,
    sources: E,
    events: EventLog,
    name: String,
    display_name: String,
    policy: AwaitPolicy,
}

impl<M: ServiceManager, E: EventSourceRegistry> AdminController<M, E> {
    pub fn new(manager: M, sources: E, events: EventLog, name: &str, display_name: &str) -> Self {
        Self {
            manager,
            sources,
            events,
            name: name.to_string(),
            display_name: display_name.to_string(),
            policy: AwaitPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AwaitPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register `executable` as an auto-started service plus its event source.
    ///
    /// When the event source cannot be registered the freshly created
    /// service is deleted again; a failure of that deletion is ignored.
    pub fn install(&self, executable: &Path) -> Result<()> {
        self.events.info(format!("Install {} service.", self.name));

        let executable = resolve_executable(executable)?;

        if self.manager.open_service(&self.name).is_ok() {
            return Err(WebSvcError::AlreadyInstalled(self.name.clone()));
        }

        let service = self.manager.create_service(&ServiceSpec {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            executable,
            arguments: AUTO_START_ARGS.iter().map(|arg| arg.to_string()).collect(),
        })?;

        if let Err(e) = self.sources.install(&self.name) {
            if let Err(rollback) = service.delete() {
                tracing::warn!("Rollback of {} failed: {}", self.name, rollback);
            }
            return Err(WebSvcError::EventSource(format!(
                "SetupEventLogSource() failed: {}",
                e
            )));
        }

        Ok(())
    }

    /// Delete the service registration and its event source.
    pub fn remove(&self) -> Result<()> {
        self.events.info(format!("Remove {} service.", self.name));

        let service = self
            .manager
            .open_service(&self.name)
            .map_err(|_| WebSvcError::NotInstalled(self.name.clone()))?;

        service.delete()?;

        self.sources
            .remove(&self.name)
            .map_err(|e| WebSvcError::EventSource(format!("RemoveEventLogSource() failed: {}", e)))
    }

    /// Issue a manual start.
    pub fn start(&self) -> Result<()> {
        let service = self.open()?;
        service
            .start(&MANUAL_START_ARGS)
            .map_err(|e| WebSvcError::Service(format!("could not start service: {}", e)))
    }

    pub fn stop(&self) -> Result<()> {
        self.control_and_await(AdminControl::Stop, ServiceState::Stopped)
    }

    pub fn pause(&self) -> Result<()> {
        self.control_and_await(AdminControl::Pause, ServiceState::Paused)
    }

    pub fn resume(&self) -> Result<()> {
        self.control_and_await(AdminControl::Continue, ServiceState::Running)
    }

    /// Send `control` once, then poll until the service reports `target`.
    ///
    /// Gives up with [`WebSvcError::Timeout`] once the policy's timeout has
    /// elapsed; the control is never re-sent.
    pub fn control_and_await(&self, control: AdminControl, target: ServiceState) -> Result<()> {
        let service = self.open()?;

        let mut state = service
            .control(control)
            .map_err(|e| WebSvcError::Service(format!("could not send control={:?}: {}", control, e)))?;

        let deadline = Instant::now() + self.policy.timeout;
        while state != target {
            if Instant::now() > deadline {
                return Err(WebSvcError::Timeout {
                    target,
                    after: self.policy.timeout,
                });
            }
            std::thread::sleep(self.policy.poll_interval);
            state = service.query_state().map_err(|e| {
                WebSvcError::Service(format!("could not retrieve service status: {}", e))
            })?;
        }

        tracing::debug!("Service {} reached {}", self.name, target);
        Ok(())
    }

    fn open(&self) -> Result<M::Service> {
        self.manager.open_service(&self.name).map_err(|e| match e {
            WebSvcError::NotInstalled(_) => e,
            other => WebSvcError::Service(format!("could not access service: {}", other)),
        })
    }
}

/// Resolve the absolute path of the service executable.
///
/// Paths without an extension that do not exist are retried with `.exe`
/// appended. Directories are rejected.
pub fn resolve_executable(path: &Path) -> Result<PathBuf> {
    let absolute = std::path::absolute(path)
        .map_err(|e| WebSvcError::Executable(format!("{}: {}", path.display(), e)))?;

    let first_error = match check_file(&absolute) {
        Ok(()) => return Ok(absolute),
        Err(e) => e,
    };

    if absolute.extension().is_none() {
        let with_exe = absolute.with_extension("exe");
        if check_file(&with_exe).is_ok() {
            return Ok(with_exe);
        }
    }

    Err(first_error)
}

fn check_file(path: &Path) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| WebSvcError::Executable(format!("{}: {}", path.display(), e)))?;
    if metadata.is_dir() {
        return Err(WebSvcError::Executable(format!(
            "{} is directory",
            path.display()
        )));
    }
    Ok(())
}

/// Connect to the local service manager and build a controller.
#[cfg(windows)]
pub fn connect(
    events: EventLog,
    name: &str,
    display_name: &str,
) -> Result<AdminController<scm::ScmManager, scm::EventLogRegistry>> {
    let manager = scm::ScmManager::connect()?;
    Ok(AdminController::new(
        manager,
        scm::EventLogRegistry,
        events,
        name,
        display_name,
    ))
}

/// Stand-in manager on platforms without a service manager.
#[cfg(not(windows))]
pub enum Unavailable {}

#[cfg(not(windows))]
impl ServiceManager for Unavailable {
    type Service = Unavailable;

    fn open_service(&self, _name: &str) -> Result<Unavailable> {
        match *self {}
    }

    fn create_service(&self, _spec: &ServiceSpec) -> Result<Unavailable> {
        match *self {}
    }
}

#[cfg(not(windows))]
impl ManagedService for Unavailable {
    fn start(&self, _arguments: &[&str]) -> Result<()> {
        match *self {}
    }

    fn control(&self, _control: AdminControl) -> Result<ServiceState> {
        match *self {}
    }

    fn query_state(&self) -> Result<ServiceState> {
        match *self {}
    }

    fn delete(&self) -> Result<()> {
        match *self {}
    }
}

#[cfg(not(windows))]
impl EventSourceRegistry for Unavailable {
    fn install(&self, _source: &str) -> Result<()> {
        match *self {}
    }

    fn remove(&self, _source: &str) -> Result<()> {
        match *self {}
    }
}

/// Non-Windows stub: there is no service manager to connect to.
#[cfg(not(windows))]
pub fn connect(
    _events: EventLog,
    _name: &str,
    _display_name: &str,
) -> Result<AdminController<Unavailable, Unavailable>> {
    Err(WebSvcError::Unsupported("Administering the service"))
}

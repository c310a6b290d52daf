//! Status reporting to the service supervisor.

use std::sync::{Arc, Mutex};

use super::state::{ServiceState, ServiceStatus};
use crate::Result;

/// Sink for status notifications emitted by the control loop.
///
/// Implementations must return quickly: the SCM expects acknowledgements
/// well within a second.
pub trait StatusReporter {
    fn report(&mut self, status: ServiceStatus) -> Result<()>;
}

/// Last status handed to the supervisor, shared with the control handler so
/// Interrogate requests can carry it.
#[derive(Clone)]
pub struct SharedStatus(Arc<Mutex<ServiceStatus>>);

impl SharedStatus {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ServiceStatus::new(ServiceState::StartPending))))
    }

    pub fn get(&self) -> ServiceStatus {
        match self.0.lock() {
            Ok(status) => *status,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set(&self, status: ServiceStatus) {
        match self.0.lock() {
            Ok(mut current) => *current = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Reporter used by the `debug` console mode: logs each status.
pub struct ConsoleReporter;

impl StatusReporter for ConsoleReporter {
    fn report(&mut self, status: ServiceStatus) -> Result<()> {
        tracing::info!(
            "Service status: {} (accepts stop={}, shutdown={}, pause/continue={})",
            status.state,
            status.accepts.stop,
            status.accepts.shutdown,
            status.accepts.pause_continue
        );
        Ok(())
    }
}

#[cfg(windows)]
pub use scm::ScmStatusReporter;

#[cfg(windows)]
mod scm {
    use std::time::Duration;

    use windows_service::service::{
        ServiceControlAccept, ServiceExitCode, ServiceState as WinServiceState,
        ServiceStatus as WinServiceStatus, ServiceType,
    };
    use windows_service::service_control_handler::ServiceStatusHandle;

    use super::{SharedStatus, StatusReporter};
    use crate::service::state::{AcceptedControls, ServiceState, ServiceStatus};
    use crate::{Result, WebSvcError};

    /// Reports status through the handle returned by control handler registration.
    pub struct ScmStatusReporter {
        handle: ServiceStatusHandle,
        current: SharedStatus,
    }

    impl ScmStatusReporter {
        pub fn new(handle: ServiceStatusHandle, current: SharedStatus) -> Self {
            Self { handle, current }
        }
    }

    impl StatusReporter for ScmStatusReporter {
        fn report(&mut self, status: ServiceStatus) -> Result<()> {
            let pending = matches!(
                status.state,
                ServiceState::StartPending
                    | ServiceState::StopPending
                    | ServiceState::PausePending
                    | ServiceState::ContinuePending
            );

            self.handle
                .set_service_status(WinServiceStatus {
                    service_type: ServiceType::OWN_PROCESS,
                    current_state: to_win_state(status.state),
                    controls_accepted: to_win_accept(status.accepts),
                    exit_code: ServiceExitCode::Win32(0),
                    checkpoint: 0,
                    wait_hint: if pending {
                        Duration::from_secs(10)
                    } else {
                        Duration::default()
                    },
                    process_id: None,
                })
                .map_err(|e| {
                    WebSvcError::Service(format!("Failed to set {} status: {}", status.state, e))
                })?;

            self.current.set(status);
            Ok(())
        }
    }

    fn to_win_state(state: ServiceState) -> WinServiceState {
        match state {
            ServiceState::StartPending => WinServiceState::StartPending,
            ServiceState::Running => WinServiceState::Running,
            ServiceState::Paused => WinServiceState::Paused,
            ServiceState::StopPending => WinServiceState::StopPending,
            ServiceState::Stopped => WinServiceState::Stopped,
            ServiceState::PausePending => WinServiceState::PausePending,
            ServiceState::ContinuePending => WinServiceState::ContinuePending,
        }
    }

    fn to_win_accept(accepts: AcceptedControls) -> ServiceControlAccept {
        let mut flags = ServiceControlAccept::empty();
        if accepts.stop {
            flags |= ServiceControlAccept::STOP;
        }
        if accepts.shutdown {
            flags |= ServiceControlAccept::SHUTDOWN;
        }
        if accepts.pause_continue {
            flags |= ServiceControlAccept::PAUSE_CONTINUE;
        }
        flags
    }
}

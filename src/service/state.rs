//! Service state, accepted controls and control request types.
//!
//! These are the platform-neutral counterparts of the SCM status record.
//! The control loop works exclusively with these types; the Windows
//! adapters in `control.rs` and `reporter.rs` translate at the boundary.

use std::fmt;
use std::time::Duration;

/// Lifecycle state of the service as reported to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    StartPending,
    Running,
    Paused,
    StopPending,
    Stopped,
    /// Only observed when polling the service manager; never entered by the control loop.
    PausePending,
    /// Only observed when polling the service manager; never entered by the control loop.
    ContinuePending,
}

impl ServiceState {
    /// Controls the service accepts while in this state.
    ///
    /// Only the steady states (Running, Paused) accept anything.
    pub fn accepted_controls(self) -> AcceptedControls {
        match self {
            ServiceState::Running | ServiceState::Paused => AcceptedControls::ALL,
            _ => AcceptedControls::NONE,
        }
    }

    /// Dispatch cadence for this state, `None` when dispatch is suspended.
    pub fn dispatch_interval(self) -> Option<DispatchInterval> {
        match self {
            ServiceState::Running => Some(DispatchInterval::Fast),
            ServiceState::Paused => Some(DispatchInterval::Slow),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::StartPending => "StartPending",
            ServiceState::Running => "Running",
            ServiceState::Paused => "Paused",
            ServiceState::StopPending => "StopPending",
            ServiceState::Stopped => "Stopped",
            ServiceState::PausePending => "PausePending",
            ServiceState::ContinuePending => "ContinuePending",
        };
        f.write_str(name)
    }
}

/// Set of control kinds the service currently accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcceptedControls {
    pub stop: bool,
    pub shutdown: bool,
    pub pause_continue: bool,
}

impl AcceptedControls {
    /// Nothing accepted (transitional states)
    pub const NONE: Self = Self {
        stop: false,
        shutdown: false,
        pause_continue: false,
    };

    /// Stop, Shutdown, Pause and Continue
    pub const ALL: Self = Self {
        stop: true,
        shutdown: true,
        pause_continue: true,
    };

    pub fn is_empty(&self) -> bool {
        !(self.stop || self.shutdown || self.pause_continue)
    }
}

/// A status report: current state plus what the service accepts in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub accepts: AcceptedControls,
}

impl ServiceStatus {
    /// Status for `state` with the controls that state implies.
    pub fn new(state: ServiceState) -> Self {
        Self {
            state,
            accepts: state.accepted_controls(),
        }
    }
}

/// A control request delivered by the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Echo the requester's last known status back.
    Interrogate(ServiceStatus),
    Stop,
    Shutdown,
    Pause,
    Continue,
    /// Any control code the loop does not handle.
    Unknown(u32),
}

/// Which of the two periodic timers drives the work callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchInterval {
    Fast,
    Slow,
}

impl DispatchInterval {
    pub fn period(self) -> Duration {
        match self {
            DispatchInterval::Fast => Duration::from_millis(500),
            DispatchInterval::Slow => Duration::from_secs(2),
        }
    }
}

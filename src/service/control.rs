//! Service control handler for Windows service events.
//!
//! The handler runs on a thread owned by the Service Control Manager (SCM).
//! It does no work itself: every control is translated into a
//! [`ControlRequest`] and forwarded to the control loop.

use tokio::sync::mpsc::UnboundedSender;

#[cfg(windows)]
use windows_service::service::ServiceControl;
#[cfg(windows)]
use windows_service::service_control_handler::ServiceControlHandlerResult;

use super::reporter::SharedStatus;
use super::state::ControlRequest;

/// State shared with the service control event handler.
pub struct ControlForwarder {
    /// Sender feeding the control loop
    requests: UnboundedSender<ControlRequest>,
    /// Last status reported to the SCM, echoed on Interrogate
    current: SharedStatus,
}

impl ControlForwarder {
    pub fn new(requests: UnboundedSender<ControlRequest>, current: SharedStatus) -> Self {
        Self { requests, current }
    }

    /// Interrogate request carrying the last reported status.
    pub fn interrogate(&self) -> ControlRequest {
        ControlRequest::Interrogate(self.current.get())
    }

    /// Forward a request. Returns `false` once the control loop has exited.
    pub fn forward(&self, request: ControlRequest) -> bool {
        match self.requests.send(request) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Control loop gone, dropping {:?}", request);
                false
            }
        }
    }
}

/// Translate an SCM control into a control request.
#[cfg(windows)]
pub fn to_request(control: &ServiceControl, forwarder: &ControlForwarder) -> ControlRequest {
    match control {
        ServiceControl::Interrogate => forwarder.interrogate(),
        ServiceControl::Stop => ControlRequest::Stop,
        ServiceControl::Shutdown => ControlRequest::Shutdown,
        ServiceControl::Pause => ControlRequest::Pause,
        ServiceControl::Continue => ControlRequest::Continue,
        other => ControlRequest::Unknown(other.raw_service_control_type()),
    }
}

/// Create a service control event handler function.
///
/// Returns a closure that forwards every control event to the control loop:
/// - Stop, Shutdown, Pause, Continue, Interrogate: forwarded, returns NoError
/// - Other: forwarded as Unknown (the loop logs it), returns NotImplemented
#[cfg(windows)]
pub fn create_event_handler(
    forwarder: ControlForwarder,
) -> impl FnMut(ServiceControl) -> ServiceControlHandlerResult {
    move |control_event| -> ServiceControlHandlerResult {
        let request = to_request(&control_event, &forwarder);
        tracing::debug!("Received control event {:?}", control_event);
        forwarder.forward(request);

        match request {
            ControlRequest::Unknown(_) => ServiceControlHandlerResult::NotImplemented,
            _ => ServiceControlHandlerResult::NoError,
        }
    }
}

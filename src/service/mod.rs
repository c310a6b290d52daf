//! Windows service lifecycle management.
//!
//! This module handles the Windows service lifecycle including:
//! - Service registration and control
//! - State transitions (StartPending -> Running <-> Paused -> StopPending -> Stopped)
//! - Periodic dispatch of the HTTP work payload
//! - Configuration loading

pub mod config;
pub mod control;
pub mod control_loop;
pub mod dispatcher;
pub mod reporter;
pub mod state;
pub mod work;

pub use config::{HttpConfig, ServiceConfig};
pub use control::ControlForwarder;
pub use control_loop::{ControlLoop, ExitReason};
pub use dispatcher::PeriodicDispatcher;
pub use reporter::{ConsoleReporter, SharedStatus, StatusReporter};
pub use state::{AcceptedControls, ControlRequest, DispatchInterval, ServiceState, ServiceStatus};
pub use work::{FirstRunGuard, HttpWork, Work};

#[cfg(windows)]
pub use control::create_event_handler;

use std::ffi::OsString;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use crate::eventlog::EventLog;
use crate::{Result, WebSvcError};

/// Service name as registered with Windows SCM
pub const SERVICE_NAME: &str = "WebSvc";

/// Service display name shown in Services console
pub const SERVICE_DISPLAY_NAME: &str = "WebSvc HTTP Server";

/// Run the control loop to completion and report the final statuses.
pub async fn drive<R: StatusReporter, W: Work>(
    control: &mut ControlLoop<R, W>,
    requests: &mut UnboundedReceiver<ControlRequest>,
) -> ExitReason {
    let reason = control.run(requests).await;
    tracing::info!("Control loop exited: {:?}", reason);
    control.finish();
    reason
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| WebSvcError::Service(format!("Failed to create tokio runtime: {}", e)))
}

/// Run the service under the SCM.
///
/// 1. Register the control handler with SCM
/// 2. Run the control loop (reports StartPending, Running)
/// 3. Forward Pause/Continue/Interrogate until Stop or Shutdown
/// 4. Report StopPending, write the stopped event, then report Stopped
#[cfg(windows)]
pub fn run_service(
    _arguments: Vec<OsString>,
    config: ServiceConfig,
    events: EventLog,
) -> Result<()> {
    use windows_service::service_control_handler;

    events.info(format!("Starting {} service.", SERVICE_NAME));

    let (request_tx, mut request_rx) = mpsc::unbounded_channel();
    let current = SharedStatus::new();

    let event_handler = create_event_handler(ControlForwarder::new(request_tx, current.clone()));
    let status_handle = service_control_handler::register(SERVICE_NAME, event_handler)
        .map_err(|e| WebSvcError::Service(format!("Failed to register control handler: {}", e)))?;

    tracing::info!("Service control handler registered");

    let runtime = build_runtime()?;
    let reporter = reporter::ScmStatusReporter::new(status_handle, current);
    let work = HttpWork::new(config.http, events.clone());

    runtime.block_on(async {
        let mut control = ControlLoop::new(reporter, work, events.clone());
        drive(&mut control, &mut request_rx).await
    });

    // The unsupervised HTTP server task is dropped with the runtime.
    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    Ok(())
}

/// Stub for non-Windows platforms.
#[cfg(not(windows))]
pub fn run_service(
    _arguments: Vec<OsString>,
    _config: ServiceConfig,
    _events: EventLog,
) -> Result<()> {
    Err(WebSvcError::Unsupported("Running under the service manager"))
}

/// Run the control loop in the console (`debug` action).
///
/// Status reports are logged and Ctrl+C is delivered as Stop.
pub fn run_console(config: ServiceConfig, events: EventLog) -> Result<()> {
    let runtime = build_runtime()?;

    runtime.block_on(async {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Ctrl+C received");
                    let _ = request_tx.send(ControlRequest::Stop);
                }
                Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
            }
        });

        tracing::info!("Running {} in console mode (press Ctrl+C to stop)", SERVICE_NAME);
        let work = HttpWork::new(config.http, events.clone());
        let mut control = ControlLoop::new(ConsoleReporter, work, events.clone());
        drive(&mut control, &mut request_rx).await;
    });

    runtime.shutdown_timeout(std::time::Duration::from_secs(1));
    Ok(())
}

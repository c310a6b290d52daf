//! WebSvc - an HTTP server hosted as a Windows service.
//!
//! This library provides the service control state machine, the periodic
//! work dispatcher, the HTTP work payload and the administrative operations
//! (install/remove/start/stop) used by the `websvc` binary.

pub mod admin;
pub mod cli;
pub mod eventlog;
pub mod http;
pub mod service;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use thiserror::Error;

use crate::service::ServiceState;

/// WebSvc error types covering all failure modes.
#[derive(Error, Debug)]
pub enum WebSvcError {
    /// Service manager connection, registration or control failures
    #[error("Service error: {0}")]
    Service(String),

    /// Install attempted while a service of the same name is registered
    #[error("service {0} already exists")]
    AlreadyInstalled(String),

    /// Remove/start/control attempted on a service that is not registered
    #[error("service {0} is not installed")]
    NotInstalled(String),

    /// Control-and-await gave up before the target state was reached
    #[error("timeout after {after:?} waiting for service to go to state={target:?}")]
    Timeout { target: ServiceState, after: Duration },

    /// Event log source registration or removal failed
    #[error("Event source error: {0}")]
    EventSource(String),

    /// The service executable could not be resolved
    #[error("Executable error: {0}")]
    Executable(String),

    /// Configuration parsing errors
    #[error("Config error: {0}")]
    Config(String),

    /// Operation requires the Windows service manager
    #[error("{0} is only supported on Windows")]
    Unsupported(&'static str),

    /// I/O errors (file/network operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using WebSvcError
pub type Result<T> = std::result::Result<T, WebSvcError>;

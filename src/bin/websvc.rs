//! WebSvc entry point.
//!
//! Launched by the Service Control Manager, this binary runs the service
//! control loop and hosts the HTTP server. Launched from a console, it takes
//! exactly one administrative action:
//!
//! ```cmd
//! websvc install
//! websvc start
//! websvc pause
//! websvc continue
//! websvc stop
//! websvc remove
//! websvc debug
//! ```
//!
//! Service logs are written to `C:\ProgramData\WebSvc\logs\websvc.log`.

#[cfg(windows)]
use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

#[cfg(windows)]
use windows_service::{define_windows_service, service_dispatcher};

use websvc::admin;
use websvc::cli::{Cli, Command};
use websvc::eventlog::EventLog;
use websvc::service::{run_console, ServiceConfig, SERVICE_DISPLAY_NAME, SERVICE_NAME};

#[cfg(windows)]
use websvc::service::run_service;

#[cfg(windows)]
define_windows_service!(ffi_service_main, service_main);

/// Service entry point called by Windows SCM.
#[cfg(windows)]
fn service_main(arguments: Vec<OsString>) {
    let (config, config_error) = load_config();
    let _guard = init_service_logging(&config);
    if let Some(e) = config_error {
        tracing::warn!("Ignoring configuration, using defaults: {}", e);
    }
    let events = EventLog::open(SERVICE_NAME);

    if let Err(e) = run_service(arguments, config, events.clone()) {
        events.error(format!("{} service failed: {}", SERVICE_NAME, e));
    }
}

/// Load the configuration, falling back to defaults on error.
///
/// The error is handed back so it can be logged after the subscriber exists.
fn load_config() -> (ServiceConfig, Option<websvc::WebSvcError>) {
    match ServiceConfig::load() {
        Ok(config) => (config, None),
        Err(e) => (ServiceConfig::default(), Some(e)),
    }
}

/// Initialize tracing with a daily rolling file for service mode.
///
/// The returned guard flushes the log writer when dropped.
#[cfg(windows)]
fn init_service_logging(config: &ServiceConfig) -> Option<WorkerGuard> {
    let log_dir = config.data_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", log_dir, e);
        // Fall back to stderr logging
        tracing_subscriber::fmt().with_env_filter("info").init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, "websvc.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter("info")
        .with_ansi(false) // No ANSI colors in log files
        .init();

    tracing::info!("Logging initialized to {:?}", log_dir);
    tracing::info!("WebSvc v{} starting", env!("CARGO_PKG_VERSION"));

    Some(guard)
}

/// Initialize tracing to stderr for console launches.
fn init_console_logging() -> Option<WorkerGuard> {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "websvc=info".to_string()),
        ))
        .init();
    Some(guard)
}

fn main() {
    // Only succeeds when launched by the SCM; blocks until the service stops.
    #[cfg(windows)]
    {
        if service_dispatcher::start(SERVICE_NAME, ffi_service_main).is_ok() {
            return;
        }
    }

    std::process::exit(run_interactive());
}

/// Parse the single action argument and run it. Returns the exit code.
fn run_interactive() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return e.exit_code();
        }
    };

    let _guard = init_console_logging();
    let events = EventLog::open(SERVICE_NAME);

    match run_command(cli.command, &events) {
        Ok(()) => 0,
        Err(e) => {
            events.error(format!(
                "Failed to {} {}: {:#}",
                cli.command.as_str(),
                SERVICE_NAME,
                e
            ));
            1
        }
    }
}

fn run_command(command: Command, events: &EventLog) -> anyhow::Result<()> {
    let connect = || admin::connect(events.clone(), SERVICE_NAME, SERVICE_DISPLAY_NAME);

    match command {
        Command::Debug => {
            let (config, config_error) = load_config();
            if let Some(e) = config_error {
                tracing::warn!("Ignoring configuration, using defaults: {}", e);
            }
            run_console(config, events.clone())?
        }
        Command::Install => {
            let exe = std::env::current_exe().context("Failed to locate the running executable")?;
            connect()?.install(&exe)?;
        }
        Command::Remove => connect()?.remove()?,
        Command::Start => connect()?.start()?,
        Command::Stop => connect()?.stop()?,
        Command::Pause => connect()?.pause()?,
        Command::Continue => connect()?.resume()?,
    }

    if command != Command::Debug {
        events.info(format!("{} {} succeeded.", command.as_str(), SERVICE_DISPLAY_NAME));
    }
    Ok(())
}

//! Command-line actions for interactive launches.

use clap::{Parser, ValueEnum};

/// Exit code used for usage errors.
pub const USAGE_EXIT_CODE: i32 = 2;

/// Administer the WebSvc Windows service.
#[derive(Debug, Parser)]
#[command(name = "websvc", version)]
pub struct Cli {
    /// Action to perform
    #[arg(value_enum, ignore_case = true)]
    pub command: Command,
}

/// Administrative action selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    /// Register the service and its event log source
    Install,
    /// Delete the service and its event log source
    Remove,
    /// Start the installed service
    Start,
    /// Stop the service and wait until it has stopped
    Stop,
    /// Pause the service and wait until it is paused
    Pause,
    /// Continue a paused service and wait until it runs
    Continue,
    /// Run the service loop in this console until Ctrl+C
    Debug,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Install => "install",
            Command::Remove => "remove",
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Pause => "pause",
            Command::Continue => "continue",
            Command::Debug => "debug",
        }
    }
}

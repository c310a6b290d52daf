//! Service configuration loading.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Result, WebSvcError};

/// Name of the optional configuration file inside the data directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Data directory for logs and config (defaults to C:\ProgramData\WebSvc)
    pub data_dir: PathBuf,
    /// HTTP work payload settings
    pub http: HttpConfig,
}

/// Settings for the HTTP server started on the first tick.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Address the listener binds to
    pub listen_addr: SocketAddr,
    /// Directory served under /static/
    pub static_dir: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir: PathBuf::from("C:/wwwRoot/static/"),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `<data_dir>\config.toml`.
    ///
    /// Defaults are returned when the file does not exist. A malformed or
    /// unreadable file is an error; callers fall back to defaults and report
    /// it once logging is up.
    pub fn load() -> Result<Self> {
        Self::load_in(&default_data_dir())
    }

    /// Load `config.toml` from `dir`, defaults when it is absent.
    pub fn load_in(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        Self::load_from(&path)
            .map(Option::unwrap_or_default)
            .map_err(|e| WebSvcError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load from an explicit file. `Ok(None)` when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text).map(Some)
    }

    /// Parse configuration from TOML text; missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| WebSvcError::Config(e.to_string()))
    }
}

#[cfg(windows)]
fn default_data_dir() -> PathBuf {
    let program_data = std::env::var("ProgramData").unwrap_or_else(|_| r"C:\ProgramData".into());
    PathBuf::from(program_data).join("WebSvc")
}

#[cfg(not(windows))]
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "websvc")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("websvc"))
}

//! Windows implementations of the service manager and event source registry.

use std::ffi::OsString;

use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::ERROR_SERVICE_DOES_NOT_EXIST;
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegSetValueExW, HKEY, HKEY_LOCAL_MACHINE,
    KEY_WRITE, REG_DWORD, REG_EXPAND_SZ, REG_OPTION_NON_VOLATILE,
};
use windows_service::service::{
    ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType,
    ServiceState as WinServiceState, ServiceType,
};
use windows_service::service_manager::{ServiceManager as WinServiceManager, ServiceManagerAccess};

use super::{AdminControl, EventSourceRegistry, ManagedService, ServiceManager, ServiceSpec};
use crate::service::ServiceState;
use crate::{Result, WebSvcError};

/// Registry key holding Application event log sources
const EVENT_LOG_KEY: &str = r"SYSTEM\CurrentControlSet\Services\EventLog\Application";

/// Message file used for sources registered as "EventCreate" sources
const EVENT_MESSAGE_FILE: &str = r"%SystemRoot%\System32\EventCreate.exe";

/// Error | Warning | Information
const TYPES_SUPPORTED: u32 = 0x1 | 0x2 | 0x4;

/// Connection to the local Service Control Manager.
///
/// Disconnects when dropped.
pub struct ScmManager {
    manager: WinServiceManager,
}

impl ScmManager {
    pub fn connect() -> Result<Self> {
        let manager = WinServiceManager::local_computer(
            None::<&str>,
            ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE,
        )
        .map_err(|e| WebSvcError::Service(format!("Failed to connect to SCM: {}", e)))?;
        Ok(Self { manager })
    }
}

fn service_access() -> ServiceAccess {
    ServiceAccess::QUERY_STATUS
        | ServiceAccess::START
        | ServiceAccess::STOP
        | ServiceAccess::PAUSE_CONTINUE
        | ServiceAccess::DELETE
}

impl ServiceManager for ScmManager {
    type Service = ScmService;

    fn open_service(&self, name: &str) -> Result<ScmService> {
        match self.manager.open_service(name, service_access()) {
            Ok(service) => Ok(ScmService { service }),
            Err(windows_service::Error::Winapi(e))
                if e.raw_os_error() == Some(ERROR_SERVICE_DOES_NOT_EXIST.0 as i32) =>
            {
                Err(WebSvcError::NotInstalled(name.to_string()))
            }
            Err(e) => Err(WebSvcError::Service(e.to_string())),
        }
    }

    fn create_service(&self, spec: &ServiceSpec) -> Result<ScmService> {
        let info = ServiceInfo {
            name: OsString::from(&spec.name),
            display_name: OsString::from(&spec.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: spec.executable.clone(),
            launch_arguments: spec.arguments.iter().map(OsString::from).collect(),
            dependencies: vec![],
            account_name: None,
            account_password: None,
        };

        let service = self
            .manager
            .create_service(&info, service_access())
            .map_err(|e| WebSvcError::Service(format!("Failed to create service: {}", e)))?;
        Ok(ScmService { service })
    }
}

/// Open handle to a registered service, closed when dropped.
pub struct ScmService {
    service: windows_service::service::Service,
}

impl ManagedService for ScmService {
    fn start(&self, arguments: &[&str]) -> Result<()> {
        self.service
            .start(arguments)
            .map_err(|e| WebSvcError::Service(e.to_string()))
    }

    fn control(&self, control: AdminControl) -> Result<ServiceState> {
        let status = match control {
            AdminControl::Stop => self.service.stop(),
            AdminControl::Pause => self.service.pause(),
            AdminControl::Continue => self.service.resume(),
        }
        .map_err(|e| WebSvcError::Service(e.to_string()))?;
        Ok(from_win_state(status.current_state))
    }

    fn query_state(&self) -> Result<ServiceState> {
        let status = self
            .service
            .query_status()
            .map_err(|e| WebSvcError::Service(e.to_string()))?;
        Ok(from_win_state(status.current_state))
    }

    fn delete(&self) -> Result<()> {
        self.service
            .delete()
            .map_err(|e| WebSvcError::Service(format!("Failed to delete service: {}", e)))
    }
}

fn from_win_state(state: WinServiceState) -> ServiceState {
    match state {
        WinServiceState::StartPending => ServiceState::StartPending,
        WinServiceState::Running => ServiceState::Running,
        WinServiceState::Paused => ServiceState::Paused,
        WinServiceState::StopPending => ServiceState::StopPending,
        WinServiceState::Stopped => ServiceState::Stopped,
        WinServiceState::PausePending => ServiceState::PausePending,
        WinServiceState::ContinuePending => ServiceState::ContinuePending,
    }
}

/// Application event log source registration in the registry.
pub struct EventLogRegistry;

impl EventSourceRegistry for EventLogRegistry {
    fn install(&self, source: &str) -> Result<()> {
        let path = HSTRING::from(format!(r"{}\{}", EVENT_LOG_KEY, source));
        let mut key = HKEY::default();

        unsafe {
            RegCreateKeyExW(
                HKEY_LOCAL_MACHINE,
                &path,
                None,
                PCWSTR::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_WRITE,
                None,
                &mut key,
                None,
            )
            .ok()
            .map_err(|e| WebSvcError::EventSource(format!("Failed to create key: {}", e)))?;
        }

        let result = set_values(key);
        unsafe {
            let _ = RegCloseKey(key);
        }
        result
    }

    fn remove(&self, source: &str) -> Result<()> {
        let path = HSTRING::from(format!(r"{}\{}", EVENT_LOG_KEY, source));
        unsafe {
            RegDeleteTreeW(HKEY_LOCAL_MACHINE, &path)
                .ok()
                .map_err(|e| WebSvcError::EventSource(format!("Failed to delete key: {}", e)))
        }
    }
}

fn set_values(key: HKEY) -> Result<()> {
    let message_file: Vec<u8> = EVENT_MESSAGE_FILE
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(|unit| unit.to_le_bytes())
        .collect();

    unsafe {
        RegSetValueExW(
            key,
            &HSTRING::from("EventMessageFile"),
            None,
            REG_EXPAND_SZ,
            Some(&message_file),
        )
        .ok()
        .map_err(|e| WebSvcError::EventSource(format!("Failed to set EventMessageFile: {}", e)))?;

        RegSetValueExW(
            key,
            &HSTRING::from("TypesSupported"),
            None,
            REG_DWORD,
            Some(&TYPES_SUPPORTED.to_le_bytes()),
        )
        .ok()
        .map_err(|e| WebSvcError::EventSource(format!("Failed to set TypesSupported: {}", e)))?;
    }

    Ok(())
}

//! Human-readable event sink.
//!
//! Every event goes to `tracing`. On Windows it is also written to the
//! Application event log under the service's event source, when that source
//! can be opened.

use std::sync::Arc;

/// Event id used for every record the service writes.
pub const EVENT_ID: u32 = 10001;

/// Severity of an event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Cloneable handle to the event sink, created once at process start.
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<Inner>,
}

struct Inner {
    source: String,
    event_id: u32,
    #[cfg(windows)]
    handle: Option<windows_log::EventSourceHandle>,
}

impl EventLog {
    /// Open the sink for `source`.
    ///
    /// A missing or unregistered Windows event source is not an error: the
    /// sink then only writes to `tracing`.
    pub fn open(source: &str) -> Self {
        #[cfg(windows)]
        let handle = match windows_log::EventSourceHandle::register(source) {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::debug!("Event source {} unavailable: {}", source, e);
                None
            }
        };

        Self {
            inner: Arc::new(Inner {
                source: source.to_string(),
                event_id: EVENT_ID,
                #[cfg(windows)]
                handle,
            }),
        }
    }

    /// A sink that only writes to `tracing`.
    pub fn tracing_only(source: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                source: source.to_string(),
                event_id: EVENT_ID,
                #[cfg(windows)]
                handle: None,
            }),
        }
    }

    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn event_id(&self) -> u32 {
        self.inner.event_id
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(Severity::Info, message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.write(Severity::Warning, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(Severity::Error, message.as_ref());
    }

    /// Write one record.
    pub fn write(&self, severity: Severity, message: &str) {
        let source = &self.inner.source;
        let event_id = self.inner.event_id;
        match severity {
            Severity::Info => tracing::info!(source = %source, event_id, "{}", message),
            Severity::Warning => tracing::warn!(source = %source, event_id, "{}", message),
            Severity::Error => tracing::error!(source = %source, event_id, "{}", message),
        }

        #[cfg(windows)]
        if let Some(handle) = &self.inner.handle {
            if let Err(e) = handle.report(severity, event_id, message) {
                tracing::debug!("Failed to write event log record: {}", e);
            }
        }
    }
}

#[cfg(windows)]
mod windows_log {
    use windows::core::{HSTRING, PCWSTR};
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::EventLog::{
        DeregisterEventSource, RegisterEventSourceW, ReportEventW, EVENTLOG_ERROR_TYPE,
        EVENTLOG_INFORMATION_TYPE, EVENTLOG_WARNING_TYPE,
    };

    use super::Severity;

    /// Owned event source handle, deregistered on drop.
    pub(super) struct EventSourceHandle(HANDLE);

    // The handle is only passed to thread-safe event log APIs.
    unsafe impl Send for EventSourceHandle {}
    unsafe impl Sync for EventSourceHandle {}

    impl EventSourceHandle {
        pub(super) fn register(source: &str) -> windows::core::Result<Self> {
            let source = HSTRING::from(source);
            let handle = unsafe { RegisterEventSourceW(PCWSTR::null(), &source)? };
            Ok(Self(handle))
        }

        pub(super) fn report(
            &self,
            severity: Severity,
            event_id: u32,
            message: &str,
        ) -> windows::core::Result<()> {
            let kind = match severity {
                Severity::Info => EVENTLOG_INFORMATION_TYPE,
                Severity::Warning => EVENTLOG_WARNING_TYPE,
                Severity::Error => EVENTLOG_ERROR_TYPE,
            };
            let message = HSTRING::from(message);
            let strings = [PCWSTR::from_raw(message.as_ptr())];

            unsafe { ReportEventW(self.0, kind, 0, event_id, None, 0, Some(&strings), None) }
        }
    }

    impl Drop for EventSourceHandle {
        fn drop(&mut self) {
            if !self.0.is_invalid() {
                unsafe {
                    let _ = DeregisterEventSource(self.0);
                }
            }
        }
    }
}

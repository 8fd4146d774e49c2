//! Client for the service manager's notification socket.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::clock::{MonotonicClock, SystemMonotonicClock};
use crate::error::NotifyError;
use crate::message::{
    Message, ERRNO, EXTEND_TIMEOUT_USEC, MAINPID, MONOTONIC_USEC, READY, RELOADING, STATUS,
    STOPPING,
};
use crate::transport::{NoopTransport, NotifyEndpoint, Transport};
#[cfg(target_os = "linux")]
use crate::transport::UnixDatagramTransport;

/// Sends lifecycle notifications to the service manager.
///
/// Cheap to clone and safe to share between threads: every call opens its
/// own socket.
#[derive(Debug, Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn MonotonicClock>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Notifier {
    /// Create a notifier for `NOTIFY_SOCKET`.
    ///
    /// Without `NOTIFY_SOCKET` (or off Linux) every notification is a no-op.
    pub fn from_env() -> Self {
        Self::with_endpoint(NotifyEndpoint::from_env())
    }

    /// Create a notifier for an explicit endpoint; `None` disables it.
    pub fn with_endpoint(endpoint: Option<NotifyEndpoint>) -> Self {
        match endpoint {
            #[cfg(target_os = "linux")]
            Some(endpoint) => {
                debug!(endpoint = %endpoint, "Service manager notifications enabled");
                Self::with_transport(UnixDatagramTransport::new(endpoint))
            }
            _ => {
                debug!("NOTIFY_SOCKET not set, service manager notifications disabled");
                Self::disabled()
            }
        }
    }

    /// A notifier that drops every message.
    pub fn disabled() -> Self {
        Self::with_transport(NoopTransport)
    }

    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
            clock: Arc::new(SystemMonotonicClock),
        }
    }

    /// Replace the clock used for `MONOTONIC_USEC`.
    pub fn with_clock(mut self, clock: impl MonotonicClock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Whether messages actually reach a service manager.
    pub fn is_enabled(&self) -> bool {
        !self.transport.is_noop()
    }

    /// Send a raw, already encoded payload.
    ///
    /// Prefer the typed helpers. Several fields that belong together must be
    /// sent in one call (see [`Message`]); separate calls are separate events.
    pub fn notify(&self, payload: &[u8]) -> Result<(), NotifyError> {
        self.transport.send(payload)
    }

    pub fn send(&self, message: &Message) -> Result<(), NotifyError> {
        self.notify(message.as_bytes())
    }

    /// Start-up (or a reload) finished.
    pub fn ready(&self) -> Result<(), NotifyError> {
        self.send(&Message::new().field(READY, "1"))
    }

    /// A reload is starting. Follow up with [`ready`](Self::ready) once it
    /// completed, or with [`error`](Self::error) if it failed.
    ///
    /// Sends `RELOADING=1` together with `MONOTONIC_USEC`, as required for
    /// `Type=notify-reload` services.
    pub fn reloading(&self) -> Result<(), NotifyError> {
        if self.transport.is_noop() {
            return Ok(());
        }
        let now = self.clock.now().map_err(NotifyError::Clock)?;
        self.send(
            &Message::new()
                .field(RELOADING, "1")
                .field(MONOTONIC_USEC, now.as_micros().to_string()),
        )
    }

    /// Shutdown is starting.
    pub fn stopping(&self) -> Result<(), NotifyError> {
        self.send(&Message::new().field(STOPPING, "1"))
    }

    /// Free-form status, shown by `systemctl status` and in the journal.
    pub fn status(&self, text: &str) -> Result<(), NotifyError> {
        self.status_bytes(text.as_bytes())
    }

    pub fn status_bytes(&self, text: &[u8]) -> Result<(), NotifyError> {
        self.send(&Message::new().field(STATUS, text))
    }

    /// Report a failure as status text plus, when `errno > 0`, an errno.
    pub fn error(&self, err: &dyn std::error::Error, errno: i32) -> Result<(), NotifyError> {
        self.error_message(&err.to_string(), errno)
    }

    pub fn error_message(&self, msg: &str, errno: i32) -> Result<(), NotifyError> {
        self.error_bytes(msg.as_bytes(), errno)
    }

    pub fn error_bytes(&self, msg: &[u8], errno: i32) -> Result<(), NotifyError> {
        let mut message = Message::new().field(STATUS, msg);
        if errno > 0 {
            message = message.field(ERRNO, errno.to_string());
        }
        self.send(&message)
    }

    /// Ask for more time to finish starting, reloading or stopping.
    pub fn extend_timeout(&self, extra: Duration) -> Result<(), NotifyError> {
        self.send(&Message::new().field(EXTEND_TIMEOUT_USEC, extra.as_micros().to_string()))
    }

    /// Tell the service manager which process is the main one.
    pub fn main_pid(&self, pid: u32) -> Result<(), NotifyError> {
        self.send(&Message::new().field(MAINPID, pid.to_string()))
    }
}

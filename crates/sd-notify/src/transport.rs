//! Delivery of encoded messages to the service manager.

use std::ffi::OsStr;
use std::fmt;
use std::io;
#[cfg(unix)]
use std::os::unix::net::UnixDatagram;
use std::path::PathBuf;

use tracing::trace;

use crate::error::NotifyError;

const ENV_NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// Sends one encoded message per call.
pub trait Transport: Send + Sync + fmt::Debug {
    fn send(&self, payload: &[u8]) -> Result<(), NotifyError>;

    /// True when messages are dropped without being sent.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Drops every message. Used when there is no service manager to talk to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTransport;

impl Transport for NoopTransport {
    fn send(&self, _payload: &[u8]) -> Result<(), NotifyError> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Address of the service manager's notification socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyEndpoint {
    /// Socket file on disk.
    Path(PathBuf),
    /// Linux abstract namespace, written as `@name` in `NOTIFY_SOCKET`.
    Abstract(Vec<u8>),
}

impl NotifyEndpoint {
    /// `None` for an empty value.
    pub fn parse(value: impl AsRef<OsStr>) -> Option<Self> {
        let value = value.as_ref();
        match value.as_encoded_bytes() {
            [] => None,
            [b'@', name @ ..] => Some(Self::Abstract(name.to_vec())),
            _ => Some(Self::Path(PathBuf::from(value))),
        }
    }

    /// Read `NOTIFY_SOCKET`; `None` when unset or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var_os(ENV_NOTIFY_SOCKET).and_then(Self::parse)
    }

    #[cfg(unix)]
    fn connect(&self, socket: &UnixDatagram) -> io::Result<()> {
        match self {
            Self::Path(path) => socket.connect(path),
            Self::Abstract(name) => connect_abstract(socket, name),
        }
    }
}

impl fmt::Display for NotifyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Abstract(name) => write!(f, "@{}", String::from_utf8_lossy(name)),
        }
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(socket: &UnixDatagram, name: &[u8]) -> io::Result<()> {
    use std::os::linux::net::SocketAddrExt;

    let addr = std::os::unix::net::SocketAddr::from_abstract_name(name)?;
    socket.connect_addr(&addr)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn connect_abstract(_socket: &UnixDatagram, _name: &[u8]) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract socket addresses are only supported on Linux",
    ))
}

/// Sends each message over a fresh unix datagram socket.
///
/// No socket is kept between calls: the service manager may recreate its
/// endpoint across reloads.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixDatagramTransport {
    endpoint: NotifyEndpoint,
}

#[cfg(unix)]
impl UnixDatagramTransport {
    pub fn new(endpoint: NotifyEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &NotifyEndpoint {
        &self.endpoint
    }

    fn open(&self) -> Result<UnixDatagram, NotifyError> {
        let connect_error = |source| NotifyError::Connect {
            endpoint: self.endpoint.to_string(),
            source,
        };
        let socket = UnixDatagram::unbound().map_err(connect_error)?;
        self.endpoint.connect(&socket).map_err(connect_error)?;
        Ok(socket)
    }
}

#[cfg(unix)]
impl Transport for UnixDatagramTransport {
    fn send(&self, payload: &[u8]) -> Result<(), NotifyError> {
        let socket = self.open()?;
        let sent = socket.send(payload).map_err(NotifyError::Send)?;
        if sent != payload.len() {
            return Err(NotifyError::ShortWrite {
                sent,
                len: payload.len(),
            });
        }
        trace!(endpoint = %self.endpoint, len = sent, "Sent notification");
        Ok(())
    }
}

//! Conversion of inherited descriptors into tokio sockets.
//!
//! Each descriptor is duplicated into the new socket and the original is
//! closed afterwards, so exactly one owner remains per socket. Conversion
//! registers with the tokio reactor and must run inside a runtime.

use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use tokio::net::{TcpListener, UdpSocket, UnixDatagram, UnixListener};
use tracing::{debug, info, warn};

use crate::batch::Activated;
use crate::error::{ActivationError, ActivationErrors};
use crate::fds::{inherited_fds, InheritedFd};
use crate::tls::TlsListener;

/// A stream listener handed over by the service manager.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
    Tls(TlsListener),
}

impl Listener {
    pub fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Self::Tcp(l) => l.local_addr().map(ListenAddr::Inet),
            Self::Unix(l) => l.local_addr().map(ListenAddr::Unix),
            Self::Tls(l) => l.local_addr().map(ListenAddr::Inet),
        }
    }

    /// `"tcp"`, `"unix"` or `"tls"`.
    pub fn network(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            Self::Unix(_) => "unix",
            Self::Tls(_) => "tls",
        }
    }
}

/// A datagram socket handed over by the service manager.
#[derive(Debug)]
pub enum Receiver {
    Udp(UdpSocket),
    Unix(UnixDatagram),
}

impl Receiver {
    pub fn local_addr(&self) -> io::Result<ListenAddr> {
        match self {
            Self::Udp(s) => s.local_addr().map(ListenAddr::Inet),
            Self::Unix(s) => s.local_addr().map(ListenAddr::Unix),
        }
    }
}

/// Bound address of an inherited socket.
#[derive(Debug)]
pub enum ListenAddr {
    Inet(std::net::SocketAddr),
    Unix(tokio::net::unix::SocketAddr),
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inet(addr) => write!(f, "{}", addr),
            Self::Unix(addr) => match addr.as_pathname() {
                Some(path) => write!(f, "{}", path.display()),
                None if addr.is_unnamed() => f.write_str("(unnamed)"),
                None => f.write_str("(abstract)"),
            },
        }
    }
}

/// A listener tagged with the name the service manager gave it.
#[derive(Debug)]
pub struct NamedListener {
    pub name: String,
    pub listener: Listener,
}

/// A datagram socket tagged with the name the service manager gave it.
#[derive(Debug)]
pub struct NamedReceiver {
    pub name: String,
    pub receiver: Receiver,
}

/// Open a listener on every descriptor passed by the service manager.
///
/// Consumes the activation environment (see [`inherited_fds`]).
pub fn open_listeners() -> Activated<NamedListener> {
    listeners_from(inherited_fds(true))
}

/// Open a datagram receiver on every descriptor passed by the service manager.
///
/// Consumes the activation environment (see [`inherited_fds`]).
pub fn open_packet_receivers() -> Activated<NamedReceiver> {
    packet_receivers_from(inherited_fds(true))
}

/// Convert the given descriptors into stream listeners.
pub fn listeners_from(fds: Vec<InheritedFd>) -> Activated<NamedListener> {
    convert(fds, |fd, name| {
        let listener = adopt_listener(fd).map_err(|source| ActivationError::Listener {
            name: name.clone(),
            fd: fd.as_raw_fd(),
            source,
        })?;
        if let Ok(addr) = listener.local_addr() {
            info!(
                fd = fd.as_raw_fd(),
                name = %name,
                addr = %addr,
                network = listener.network(),
                "Opened inherited listener"
            );
        }
        Ok(NamedListener { name, listener })
    })
}

/// Convert the given descriptors into datagram receivers.
pub fn packet_receivers_from(fds: Vec<InheritedFd>) -> Activated<NamedReceiver> {
    convert(fds, |fd, name| {
        let receiver = adopt_receiver(fd).map_err(|source| ActivationError::Receiver {
            name: name.clone(),
            fd: fd.as_raw_fd(),
            source,
        })?;
        if let Ok(addr) = receiver.local_addr() {
            info!(
                fd = fd.as_raw_fd(),
                name = %name,
                addr = %addr,
                "Opened inherited packet receiver"
            );
        }
        Ok(NamedReceiver { name, receiver })
    })
}

fn convert<T, F>(fds: Vec<InheritedFd>, mut adopt: F) -> Activated<T>
where
    F: FnMut(&OwnedFd, String) -> Result<T, ActivationError>,
{
    let mut sockets = Vec::with_capacity(fds.len());
    let mut errors = ActivationErrors::new();

    for inherited in fds {
        let (fd, name) = inherited.into_parts();
        match adopt(&fd, name) {
            Ok(socket) => sockets.push(socket),
            Err(err) => {
                warn!(
                    fd = err.fd(),
                    name = err.name(),
                    error = %err,
                    "Failed to adopt inherited fd"
                );
                errors.push(err);
            }
        }
        // The socket owns a duplicate; release the original either way.
        drop(fd);
    }

    debug!(
        opened = sockets.len(),
        failed = errors.len(),
        "Finished adopting inherited fds"
    );

    Activated { sockets, errors }
}

fn adopt_listener(fd: &OwnedFd) -> io::Result<Listener> {
    let info = SocketInfo::inspect(fd.as_fd())?;
    if info.sock_type != libc::SOCK_STREAM {
        return Err(invalid(format!(
            "expected a stream socket, found socket type {}",
            info.sock_type
        )));
    }
    if !info.listening {
        return Err(invalid("stream socket is not listening"));
    }

    let dup = fd.try_clone()?;
    match info.family {
        libc::AF_INET | libc::AF_INET6 => {
            let std_listener = std::net::TcpListener::from(dup);
            std_listener.set_nonblocking(true)?;
            Ok(Listener::Tcp(TcpListener::from_std(std_listener)?))
        }
        libc::AF_UNIX => {
            let std_listener = std::os::unix::net::UnixListener::from(dup);
            std_listener.set_nonblocking(true)?;
            Ok(Listener::Unix(UnixListener::from_std(std_listener)?))
        }
        family => Err(invalid(format!("unsupported address family {}", family))),
    }
}

fn adopt_receiver(fd: &OwnedFd) -> io::Result<Receiver> {
    let info = SocketInfo::inspect(fd.as_fd())?;
    if info.sock_type != libc::SOCK_DGRAM {
        return Err(invalid(format!(
            "expected a datagram socket, found socket type {}",
            info.sock_type
        )));
    }

    let dup = fd.try_clone()?;
    match info.family {
        libc::AF_INET | libc::AF_INET6 => {
            let std_socket = std::net::UdpSocket::from(dup);
            std_socket.set_nonblocking(true)?;
            Ok(Receiver::Udp(UdpSocket::from_std(std_socket)?))
        }
        libc::AF_UNIX => {
            let std_socket = std::os::unix::net::UnixDatagram::from(dup);
            std_socket.set_nonblocking(true)?;
            Ok(Receiver::Unix(UnixDatagram::from_std(std_socket)?))
        }
        family => Err(invalid(format!("unsupported address family {}", family))),
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}

/// What the kernel reports about a socket descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketInfo {
    sock_type: libc::c_int,
    family: libc::c_int,
    listening: bool,
}

impl SocketInfo {
    /// Fails with `ENOTSOCK` for descriptors that are not sockets.
    fn inspect(fd: BorrowedFd<'_>) -> io::Result<Self> {
        let sock_type = getsockopt_int(fd, libc::SOL_SOCKET, libc::SO_TYPE)?;
        let listening = getsockopt_int(fd, libc::SOL_SOCKET, libc::SO_ACCEPTCONN)? != 0;
        let family = socket_family(fd)?;
        Ok(Self {
            sock_type,
            family,
            listening,
        })
    }
}

fn getsockopt_int(
    fd: BorrowedFd<'_>,
    level: libc::c_int,
    name: libc::c_int,
) -> io::Result<libc::c_int> {
    let mut value: libc::c_int = 0;
    let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
    let result = unsafe {
        libc::getsockopt(
            fd.as_raw_fd(),
            level,
            name,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(value)
}

fn socket_family(fd: BorrowedFd<'_>) -> io::Result<libc::c_int> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let result = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
            &mut len,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(storage.ss_family as libc::c_int)
}

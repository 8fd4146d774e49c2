//! TLS on top of inherited TCP listeners.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::{Accept, TlsAcceptor};
use tracing::debug;

use crate::batch::Activated;
use crate::socket::{open_listeners, Listener, NamedListener};

/// A TCP listener whose connections are served over TLS.
pub struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(listener: TcpListener, config: Arc<ServerConfig>) -> Self {
        Self {
            listener,
            acceptor: TlsAcceptor::from(config),
        }
    }

    /// Accept the next TCP connection and start its TLS handshake.
    ///
    /// The returned future completes the handshake. Await it on the
    /// connection's own task so a slow client does not hold up the accept
    /// loop.
    pub async fn accept(&self) -> io::Result<(Accept<TcpStream>, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        Ok((self.acceptor.accept(stream), peer))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn acceptor(&self) -> &TlsAcceptor {
        &self.acceptor
    }

    pub fn get_ref(&self) -> &TcpListener {
        &self.listener
    }

    pub fn into_inner(self) -> TcpListener {
        self.listener
    }
}

impl fmt::Debug for TlsListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsListener")
            .field("listener", &self.listener)
            .field("acceptor", &"[TlsAcceptor]")
            .finish()
    }
}

/// Same as [`open_listeners`], with every TCP listener wrapped in TLS.
///
/// Unix listeners are returned unwrapped. With no `config` the plain
/// listeners are returned unchanged.
pub fn open_tls_listeners(config: Option<Arc<ServerConfig>>) -> Activated<NamedListener> {
    wrap_tls(open_listeners(), config)
}

/// Wrap the TCP listeners of an activation batch in TLS, in place.
///
/// Conversion errors of the batch are carried over untouched.
pub fn wrap_tls(
    mut activated: Activated<NamedListener>,
    config: Option<Arc<ServerConfig>>,
) -> Activated<NamedListener> {
    let Some(config) = config else {
        return activated;
    };
    if activated.sockets.is_empty() {
        return activated;
    }

    let acceptor = TlsAcceptor::from(config);
    activated.sockets = activated
        .sockets
        .into_iter()
        .map(|NamedListener { name, listener }| {
            let listener = match listener {
                Listener::Tcp(listener) => {
                    debug!(name = %name, "Serving inherited TCP listener over TLS");
                    Listener::Tls(TlsListener {
                        listener,
                        acceptor: acceptor.clone(),
                    })
                }
                other => other,
            };
            NamedListener { name, listener }
        })
        .collect();

    activated
}

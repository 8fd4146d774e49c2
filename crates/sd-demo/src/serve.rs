//! Accept loops: every connection receives the greeting line and is closed.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use sd_listen::{Listener, NamedListener};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tokio::task::JoinHandle;
use tokio_rustls::Accept;
use tracing::{debug, info, warn};

use crate::shutdown::GracefulShutdown;

/// Upper bound for one connection, TLS handshake included.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept, e.g. when out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A connection that has been accepted but not yet served.
enum Incoming {
    Tcp(TcpStream),
    Unix(UnixStream),
    Tls(Accept<TcpStream>),
}

impl Incoming {
    async fn serve(self, greeting: &str) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => greet(stream, greeting).await,
            Self::Unix(stream) => greet(stream, greeting).await,
            Self::Tls(handshake) => greet(handshake.await?, greeting).await,
        }
    }
}

async fn greet<S: AsyncWrite + Unpin>(mut stream: S, greeting: &str) -> io::Result<()> {
    stream.write_all(greeting.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await
}

async fn accept(listener: &Listener) -> io::Result<(Incoming, String)> {
    match listener {
        Listener::Tcp(listener) => {
            let (stream, peer) = listener.accept().await?;
            Ok((Incoming::Tcp(stream), peer.to_string()))
        }
        Listener::Unix(listener) => {
            let (stream, peer) = listener.accept().await?;
            let peer = peer
                .as_pathname()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "unnamed".to_string());
            Ok((Incoming::Unix(stream), peer))
        }
        Listener::Tls(listener) => {
            let (handshake, peer) = listener.accept().await?;
            Ok((Incoming::Tls(handshake), peer.to_string()))
        }
    }
}

/// Serve `named` until the shutdown token is cancelled.
///
/// Each connection holds a [`ConnectionGuard`](crate::shutdown::ConnectionGuard)
/// so a stop request can wait for it.
pub fn spawn_listener(
    named: NamedListener,
    greeting: Arc<str>,
    shutdown: GracefulShutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let NamedListener { name, listener } = named;
        let stop = shutdown.stop_token();

        match listener.local_addr() {
            Ok(addr) => info!(name = %name, network = listener.network(), addr = %addr, "Serving"),
            Err(err) => info!(name = %name, network = listener.network(), error = %err, "Serving"),
        }

        loop {
            let accepted = tokio::select! {
                _ = stop.cancelled() => break,
                accepted = accept(&listener) => accepted,
            };

            let (incoming, peer) = match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(name = %name, error = %err, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            debug!(name = %name, peer = %peer, "Accepted connection");
            let guard = shutdown.connection_guard();
            let greeting = Arc::clone(&greeting);
            let listener_name = name.clone();
            tokio::spawn(async move {
                let _guard = guard;
                match tokio::time::timeout(CONNECTION_TIMEOUT, incoming.serve(&greeting)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(name = %listener_name, peer = %peer, error = %err, "Connection failed")
                    }
                    Err(_) => warn!(name = %listener_name, peer = %peer, "Connection timed out"),
                }
            });
        }

        info!(name = %name, "Stopped accepting");
    })
}

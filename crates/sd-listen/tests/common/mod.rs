//! Shared helpers for activation tests: fake inherited descriptors and
//! throwaway TLS credentials.

#![allow(dead_code)]

use std::os::unix::io::OwnedFd;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use sd_listen::InheritedFd;
use tokio_rustls::TlsConnector;

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Install the ring crypto provider for rustls.
pub fn install_crypto_provider() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install crypto provider");
    });
}

pub fn tcp_fd(name: &str) -> (InheritedFd, std::net::SocketAddr) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (InheritedFd::new(OwnedFd::from(listener), name), addr)
}

pub fn unix_listener_fd(path: &Path, name: &str) -> InheritedFd {
    let listener = std::os::unix::net::UnixListener::bind(path).unwrap();
    InheritedFd::new(OwnedFd::from(listener), name)
}

pub fn udp_fd(name: &str) -> (InheritedFd, std::net::SocketAddr) {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();
    (InheritedFd::new(OwnedFd::from(socket), name), addr)
}

pub fn unix_datagram_fd(path: &Path, name: &str) -> InheritedFd {
    let socket = std::os::unix::net::UnixDatagram::bind(path).unwrap();
    InheritedFd::new(OwnedFd::from(socket), name)
}

/// A descriptor that is open but not a socket.
pub fn file_fd(name: &str) -> InheritedFd {
    let file = tempfile::tempfile().unwrap();
    InheritedFd::new(OwnedFd::from(file), name)
}

/// Self-signed credentials for `localhost`.
pub struct TestTlsCredentials {
    pub cert_der: CertificateDer<'static>,
    pub key_der: Vec<u8>,
}

impl TestTlsCredentials {
    pub fn generate() -> Self {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()])
                .expect("Failed to generate test certificate");

        Self {
            cert_der: CertificateDer::from(cert.der().to_vec()),
            key_der: key_pair.serialize_der(),
        }
    }

    pub fn server_config(&self) -> Arc<ServerConfig> {
        install_crypto_provider();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()));
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![self.cert_der.clone()], key)
            .expect("Failed to create server config");
        Arc::new(config)
    }

    pub fn tls_connector(&self) -> TlsConnector {
        install_crypto_provider();
        let mut root_store = RootCertStore::empty();
        root_store
            .add(self.cert_der.clone())
            .expect("Failed to add cert");

        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        TlsConnector::from(Arc::new(client_config))
    }
}

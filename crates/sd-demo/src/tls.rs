//! TLS material for the demo's TCP listeners.
//!
//! The certificate is served through [`ReloadableCert`], so a reload swaps it
//! for new connections without rebuilding the listeners.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use thiserror::Error;
use tracing::info;

use crate::config::TlsPaths;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PEM in {}: {source}", .path.display())]
    Pem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .path.display())]
    NoCertificates { path: PathBuf },

    #[error("no private key found in {}", .path.display())]
    NoPrivateKey { path: PathBuf },

    #[error("unsupported private key in {}: {source}", .path.display())]
    Key {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("TLS reload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Certificate resolver whose key pair can be replaced at runtime.
#[derive(Debug)]
pub struct ReloadableCert {
    paths: TlsPaths,
    current: RwLock<Arc<CertifiedKey>>,
}

impl ReloadableCert {
    /// Read the certificate chain and key once.
    pub fn load(paths: TlsPaths) -> Result<Self, TlsError> {
        let key = load_certified_key(&paths)?;
        Ok(Self {
            paths,
            current: RwLock::new(Arc::new(key)),
        })
    }

    /// Read the files again. On failure the previous key pair stays in use.
    pub fn reload(&self) -> Result<(), TlsError> {
        let key = Arc::new(load_certified_key(&self.paths)?);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = key;
        info!(cert = %self.paths.cert.display(), "TLS certificate reloaded");
        Ok(())
    }

    /// [`reload`](Self::reload) on the blocking pool, keeping file reads off
    /// the async workers.
    pub async fn reload_in_background(self: Arc<Self>) -> Result<(), TlsError> {
        tokio::task::spawn_blocking(move || self.reload()).await?
    }

    pub fn current(&self) -> Arc<CertifiedKey> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn paths(&self) -> &TlsPaths {
        &self.paths
    }
}

impl ResolvesServerCert for ReloadableCert {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current())
    }
}

/// Server config that always asks `resolver` for the certificate.
///
/// Uses the process-wide default crypto provider.
pub fn server_config(resolver: Arc<ReloadableCert>) -> Arc<ServerConfig> {
    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    Arc::new(config)
}

fn load_certified_key(paths: &TlsPaths) -> Result<CertifiedKey, TlsError> {
    let certs = load_certs(&paths.cert)?;
    let key = load_private_key(&paths.key)?;
    let signing_key =
        rustls::crypto::ring::sign::any_supported_type(&key).map_err(|source| TlsError::Key {
            path: paths.key.clone(),
            source,
        })?;
    Ok(CertifiedKey::new(certs, signing_key))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

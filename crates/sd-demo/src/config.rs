//! Command line and environment configuration.
//!
//! # Environment Variables
//!
//! - `SD_DEMO_TLS_CERT`: PEM certificate chain. Requires `SD_DEMO_TLS_KEY`.
//! - `SD_DEMO_TLS_KEY`: PEM private key. Requires `SD_DEMO_TLS_CERT`.
//! - `SD_DEMO_DRAIN_TIMEOUT_SECS`: how long to wait for open connections on
//!   shutdown. Default: 30
//! - `SD_DEMO_GREETING`: line written to every client. Default: `Hello, world!`
//!
//! Flags take precedence over the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

/// Serve a greeting on sockets inherited from the service manager.
#[derive(Debug, Clone, Parser)]
#[command(name = "sd-demo")]
#[command(author, version, about, long_about = None)]
pub struct DemoConfig {
    /// PEM certificate chain; TCP listeners speak TLS when set.
    #[arg(long, env = "SD_DEMO_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key matching `--tls-cert`.
    #[arg(long, env = "SD_DEMO_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Seconds to wait for open connections after a stop request.
    #[arg(long, env = "SD_DEMO_DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    /// Line written to every client before the connection is closed.
    #[arg(long, env = "SD_DEMO_GREETING", default_value = "Hello, world!")]
    pub greeting: String,
}

/// Certificate and key locations, re-read on every reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl DemoConfig {
    pub fn tls_paths(&self) -> Option<TlsPaths> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.clone(),
                key: key.clone(),
            }),
            _ => None,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn log_config(&self) {
        match self.tls_paths() {
            Some(paths) => info!(
                cert = %paths.cert.display(),
                key = %paths.key.display(),
                "TLS: enabled for TCP listeners"
            ),
            None => info!("TLS: disabled"),
        }
        info!(
            drain_timeout_secs = self.drain_timeout_secs,
            "Drain timeout configured"
        );
    }
}

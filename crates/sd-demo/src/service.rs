//! Service lifecycle: start serving, report to the service manager, react
//! to signals.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use sd_listen::open_tls_listeners;
use sd_notify::{
    recommended_ping_interval, spawn_keepalive, watchdog_interval, Notifier, NotifyError,
};
use tracing::{debug, error, info, warn};

use crate::config::DemoConfig;
use crate::shutdown::{GracefulShutdown, Signals};
use crate::tls::{self, ReloadableCert};
use crate::{serve, telemetry};

/// Serve until SIGTERM or SIGINT, reloading on SIGHUP.
pub async fn run(config: DemoConfig) -> Result<()> {
    // Install the ring crypto provider for rustls
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    telemetry::init().map_err(|e| anyhow!("Failed to init telemetry: {}", e))?;

    info!("sd-demo starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    let notifier = Notifier::from_env();
    let mut signals = Signals::register().context("Failed to register signal handlers")?;

    let cert = match config.tls_paths() {
        Some(paths) => Some(Arc::new(
            ReloadableCert::load(paths).context("Failed to load TLS material")?,
        )),
        None => None,
    };

    let activated = open_tls_listeners(cert.clone().map(tls::server_config));
    for err in &activated.errors {
        warn!(
            name = err.name(),
            fd = err.fd(),
            error = %err,
            "Skipping inherited socket"
        );
    }
    if activated.sockets.is_empty() {
        warn!("No listening sockets were passed by the service manager");
    }

    let shutdown = GracefulShutdown::new(config.drain_timeout());
    let greeting: Arc<str> = Arc::from(config.greeting.as_str());
    let socket_count = activated.sockets.len();
    let accept_loops: Vec<_> = activated
        .sockets
        .into_iter()
        .map(|listener| {
            serve::spawn_listener(listener, Arc::clone(&greeting), shutdown.clone())
        })
        .collect();

    let watchdog = match watchdog_interval() {
        Some(interval) => {
            let period = recommended_ping_interval(interval);
            info!(
                interval_ms = interval.as_millis() as u64,
                "Watchdog enabled by service manager"
            );
            Some(spawn_keepalive(notifier.clone(), period, shutdown.stop_token()))
        }
        None => {
            debug!("Watchdog not configured");
            None
        }
    };

    report("READY", notifier.ready());
    report(
        "STATUS",
        notifier.status(&format!("Serving on {} socket(s)", socket_count)),
    );
    info!(sockets = socket_count, "sd-demo ready");

    loop {
        let signal = signals.recv().await;
        if signal.is_stop() {
            break;
        }
        reload(&notifier, cert.clone()).await;
    }

    report("STOPPING", notifier.stopping());
    info!("Stopping accept loops");
    shutdown.trigger_stop();

    for handle in accept_loops {
        if let Err(err) = handle.await {
            error!(error = %err, "Accept loop panicked");
        }
    }
    if let Some(handle) = watchdog {
        if let Err(err) = handle.await {
            error!(error = %err, "Watchdog task panicked");
        }
    }

    if !shutdown.drain().await {
        error!(
            remaining_connections = shutdown.active_connections(),
            "Exiting with open connections"
        );
    }

    info!("sd-demo stopped");
    Ok(())
}

/// Handle SIGHUP: re-read TLS material and report the outcome.
///
/// On failure the previous certificate keeps serving and the service manager
/// is told the reload failed.
async fn reload(notifier: &Notifier, cert: Option<Arc<ReloadableCert>>) {
    report("RELOADING", notifier.reloading());

    let result = match cert {
        Some(cert) => {
            debug!(
                cert = %cert.paths().cert.display(),
                key = %cert.paths().key.display(),
                "Reloading TLS material"
            );
            cert.reload_in_background().await
        }
        None => {
            debug!("No TLS material configured, nothing to reload");
            Ok(())
        }
    };

    match result {
        Ok(()) => {
            info!("Reload complete");
            report("READY", notifier.ready());
        }
        Err(err) => {
            error!(error = %err, "Reload failed, keeping previous configuration");
            report("ERRNO", notifier.error(&err, libc::EINVAL));
        }
    }
}

/// Notification failures never stop the service.
fn report(kind: &str, result: Result<(), NotifyError>) {
    if let Err(err) = result {
        warn!(kind, error = %err, "Failed to notify service manager");
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use crate::tls::test_support::PemFiles;
    use sd_notify::{FixedClock, NotifyEndpoint};
    use std::os::unix::net::UnixDatagram;
    use std::time::Duration;

    /// Notification socket standing in for the service manager.
    struct Supervisor {
        socket: UnixDatagram,
        notifier: Notifier,
        _dir: tempfile::TempDir,
    }

    impl Supervisor {
        fn start() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("notify.sock");
            let socket = UnixDatagram::bind(&path).unwrap();
            socket
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let notifier = Notifier::with_endpoint(Some(NotifyEndpoint::Path(path)))
                .with_clock(FixedClock(Duration::from_micros(1_500_000)));
            Self {
                socket,
                notifier,
                _dir: dir,
            }
        }

        fn recv(&self) -> String {
            let mut buf = vec![0u8; 4096];
            let n = self.socket.recv(&mut buf).unwrap();
            String::from_utf8(buf[..n].to_vec()).unwrap()
        }
    }

    #[tokio::test]
    async fn test_reload_swaps_certificate_and_reports_ready() {
        let supervisor = Supervisor::start();
        let mut files = PemFiles::generate();
        let cert = Arc::new(ReloadableCert::load(files.paths.clone()).unwrap());

        files.rotate();
        reload(&supervisor.notifier, Some(Arc::clone(&cert))).await;

        assert_eq!(supervisor.recv(), "RELOADING=1\nMONOTONIC_USEC=1500000");
        assert_eq!(supervisor.recv(), "READY=1");
        assert_eq!(cert.current().cert, vec![files.cert_der.clone()]);
    }

    #[tokio::test]
    async fn test_failed_reload_reports_errno() {
        let supervisor = Supervisor::start();
        let files = PemFiles::generate();
        let cert = Arc::new(ReloadableCert::load(files.paths.clone()).unwrap());
        let before = cert.current();

        std::fs::write(&files.paths.key, "not a key").unwrap();
        reload(&supervisor.notifier, Some(Arc::clone(&cert))).await;

        assert_eq!(supervisor.recv(), "RELOADING=1\nMONOTONIC_USEC=1500000");
        let failure = supervisor.recv();
        assert!(failure.starts_with("STATUS=no private key found in "));
        assert!(failure.ends_with("\nERRNO=22"));
        assert_eq!(cert.current().cert, before.cert);
    }

    #[tokio::test]
    async fn test_reload_without_tls_reports_ready() {
        let supervisor = Supervisor::start();
        reload(&supervisor.notifier, None).await;

        assert_eq!(supervisor.recv(), "RELOADING=1\nMONOTONIC_USEC=1500000");
        assert_eq!(supervisor.recv(), "READY=1");
    }
}

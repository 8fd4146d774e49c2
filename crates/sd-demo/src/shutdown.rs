//! Signal handling and connection draining.
//!
//! - `SIGHUP` → reload TLS material, keep serving
//! - `SIGTERM` / `SIGINT` → stop accepting, drain, exit
//!
//! Uses `CancellationToken` for coordination and `ConnectionGuard` for drain tracking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What the service manager (or an operator) asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    /// SIGHUP: reload configuration.
    Reload,
    /// SIGTERM: graceful stop.
    Terminate,
    /// SIGINT: graceful stop, usually from a terminal.
    Interrupt,
}

impl LifecycleSignal {
    pub fn is_stop(self) -> bool {
        matches!(self, Self::Terminate | Self::Interrupt)
    }
}

/// Handlers for the lifecycle signals, registered once at startup.
pub struct Signals {
    hangup: Signal,
    terminate: Signal,
    interrupt: Signal,
}

impl Signals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            terminate: signal(SignalKind::terminate())?,
            interrupt: signal(SignalKind::interrupt())?,
        })
    }

    pub async fn recv(&mut self) -> LifecycleSignal {
        tokio::select! {
            _ = self.hangup.recv() => {
                info!("Received SIGHUP, reloading");
                LifecycleSignal::Reload
            }
            _ = self.terminate.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                LifecycleSignal::Terminate
            }
            _ = self.interrupt.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
                LifecycleSignal::Interrupt
            }
        }
    }
}

/// Tracks one open connection; dropping it marks the connection finished.
#[derive(Clone)]
pub struct ConnectionGuard {
    _drop_notifier: Arc<DropNotifier>,
}

struct DropNotifier {
    counter: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl Drop for DropNotifier {
    fn drop(&mut self) {
        let prev = self.counter.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            self.notify.notify_waiters();
        }
    }
}

/// Coordinator for graceful shutdown with connection draining.
#[derive(Clone)]
pub struct GracefulShutdown {
    /// Cancelled when accept loops and background tasks should stop.
    stop: CancellationToken,
    connection_count: Arc<AtomicUsize>,
    /// Notified when the last connection drains.
    drain_notify: Arc<Notify>,
    drain_timeout: Duration,
}

impl GracefulShutdown {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            stop: CancellationToken::new(),
            connection_count: Arc::new(AtomicUsize::new(0)),
            drain_notify: Arc::new(Notify::new()),
            drain_timeout,
        }
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Increments the counter on creation, decrements on drop.
    pub fn connection_guard(&self) -> ConnectionGuard {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            _drop_notifier: Arc::new(DropNotifier {
                counter: Arc::clone(&self.connection_count),
                notify: Arc::clone(&self.drain_notify),
            }),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.connection_count.load(Ordering::SeqCst)
    }

    pub fn trigger_stop(&self) {
        self.stop.cancel();
    }

    /// Wait for open connections to finish, up to the drain timeout.
    ///
    /// Returns `true` if all connections drained, `false` if timed out.
    pub async fn drain(&self) -> bool {
        let active = self.active_connections();
        if active == 0 {
            info!("No active connections, drain complete");
            return true;
        }

        info!(
            active_connections = active,
            timeout_secs = self.drain_timeout.as_secs(),
            "Draining active connections"
        );

        tokio::select! {
            _ = self.wait_for_drain() => {
                info!("All connections drained cleanly");
                true
            }
            _ = tokio::time::sleep(self.drain_timeout) => {
                warn!(
                    remaining_connections = self.active_connections(),
                    timeout_secs = self.drain_timeout.as_secs(),
                    "Drain timeout expired"
                );
                false
            }
        }
    }

    async fn wait_for_drain(&self) {
        loop {
            let drained = self.drain_notify.notified();
            if self.connection_count.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_graceful_drain() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        let stop_token = shutdown.stop_token();

        let guard1 = shutdown.connection_guard();
        let guard2 = shutdown.connection_guard();
        assert_eq!(shutdown.active_connections(), 2);

        shutdown.trigger_stop();
        assert!(stop_token.is_cancelled());

        drop(guard1);
        assert_eq!(shutdown.active_connections(), 1);

        drop(guard2);
        assert_eq!(shutdown.active_connections(), 0);

        assert!(shutdown.drain().await);
    }

    #[tokio::test]
    async fn test_drain_waits_for_late_close() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(5));
        let guard = shutdown.connection_guard();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(guard);
        });

        assert!(shutdown.drain().await);
        assert_eq!(shutdown.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_drain_timeout() {
        let shutdown = GracefulShutdown::new(Duration::from_millis(100));

        let _guard = shutdown.connection_guard();
        shutdown.trigger_stop();

        assert!(!shutdown.drain().await);
        assert_eq!(shutdown.active_connections(), 1);
    }

    #[tokio::test]
    async fn test_connection_guard_counting() {
        let shutdown = GracefulShutdown::new(Duration::from_secs(1));
        assert_eq!(shutdown.active_connections(), 0);

        let mut guards: Vec<_> = (0..10).map(|_| shutdown.connection_guard()).collect();
        assert_eq!(shutdown.active_connections(), 10);

        guards.truncate(5);
        assert_eq!(shutdown.active_connections(), 5);

        drop(guards);
        assert_eq!(shutdown.active_connections(), 0);
    }

    #[test]
    fn test_stop_signals() {
        assert!(LifecycleSignal::Terminate.is_stop());
        assert!(LifecycleSignal::Interrupt.is_stop());
        assert!(!LifecycleSignal::Reload.is_stop());
    }

    // The only test that raises a signal; the handlers are installed first so
    // SIGHUP does not terminate the test binary.
    #[tokio::test]
    async fn test_sighup_is_reload() {
        let mut signals = Signals::register().unwrap();
        unsafe {
            libc::kill(libc::getpid(), libc::SIGHUP);
        }
        let received = tokio::time::timeout(Duration::from_secs(5), signals.recv())
            .await
            .unwrap();
        assert_eq!(received, LifecycleSignal::Reload);
    }
}

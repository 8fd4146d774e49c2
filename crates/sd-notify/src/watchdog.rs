//! Watchdog keep-alives.
//!
//! When the unit sets `WatchdogSec=`, the service manager exports
//! `WATCHDOG_USEC` and `WATCHDOG_PID` and expects `WATCHDOG=1` at least once
//! per interval.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::NotifyError;
use crate::message::{Message, WATCHDOG};
use crate::notifier::Notifier;

const ENV_WATCHDOG_USEC: &str = "WATCHDOG_USEC";
const ENV_WATCHDOG_PID: &str = "WATCHDOG_PID";

/// Shortest period [`spawn_keepalive`] will tick at.
const MIN_KEEPALIVE_PERIOD: Duration = Duration::from_millis(1);

/// Raw watchdog variables as found in the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchdogEnv {
    pub usec: Option<String>,
    pub pid: Option<String>,
}

impl WatchdogEnv {
    pub fn from_env() -> Self {
        Self {
            usec: std::env::var(ENV_WATCHDOG_USEC).ok(),
            pid: std::env::var(ENV_WATCHDOG_PID).ok(),
        }
    }

    /// The watchdog interval for process `pid`, if one is configured.
    ///
    /// `None` when either variable is missing, unparsable or not positive,
    /// or when `WATCHDOG_PID` names another process. Malformed values are
    /// logged but still only mean "no watchdog".
    pub fn interval(&self, pid: u32) -> Option<Duration> {
        let usec = self.usec.as_deref().filter(|v| !v.is_empty())?;
        let usec = match usec.parse::<i64>() {
            Ok(usec) if usec >= 1 => usec,
            Ok(usec) => {
                warn!(usec, "WATCHDOG_USEC must be a positive integer, watchdog disabled");
                return None;
            }
            Err(err) => {
                warn!(value = usec, error = %err, "Unable to parse WATCHDOG_USEC, watchdog disabled");
                return None;
            }
        };

        let watchdog_pid = self.pid.as_deref().filter(|v| !v.is_empty())?;
        match watchdog_pid.parse::<u32>() {
            Ok(expected) if expected == pid => Some(Duration::from_micros(usec as u64)),
            Ok(expected) => {
                debug!(expected, pid, "WATCHDOG_PID names another process");
                None
            }
            Err(err) => {
                warn!(value = watchdog_pid, error = %err, "Unable to parse WATCHDOG_PID, watchdog disabled");
                None
            }
        }
    }
}

/// The watchdog interval configured for this process, if any.
///
/// Ping at least this often; [`recommended_ping_interval`] leaves headroom.
#[cfg(target_os = "linux")]
pub fn watchdog_interval() -> Option<Duration> {
    WatchdogEnv::from_env().interval(std::process::id())
}

/// No service manager watches this process off Linux.
#[cfg(not(target_os = "linux"))]
pub fn watchdog_interval() -> Option<Duration> {
    None
}

/// Half the watchdog interval, the cadence sd_watchdog_enabled(3) suggests.
pub fn recommended_ping_interval(interval: Duration) -> Duration {
    interval / 2
}

/// Ping the watchdog every `period` until `token` is cancelled.
///
/// Failed pings are logged and the loop carries on; the service manager will
/// act on the missed interval by itself. A period below one millisecond is
/// raised to one millisecond.
pub fn spawn_keepalive(
    notifier: Notifier,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_KEEPALIVE_PERIOD);
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_ms = period.as_millis() as u64, "Watchdog keep-alive started");
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Watchdog keep-alive stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = notifier.watchdog() {
                        warn!(error = %err, "Failed to send watchdog keep-alive");
                    }
                }
            }
        }
    })
}

impl Notifier {
    /// Keep-alive ping: `WATCHDOG=1`.
    pub fn watchdog(&self) -> Result<(), NotifyError> {
        self.send(&Message::new().field(WATCHDOG, "1"))
    }

    /// Report an internal fault now, with the same effect as a missed
    /// keep-alive: `WATCHDOG=trigger`.
    pub fn watchdog_trigger(&self) -> Result<(), NotifyError> {
        self.send(&Message::new().field(WATCHDOG, "trigger"))
    }

    /// Read the watchdog interval once and ping at that interval until
    /// `token` is cancelled.
    ///
    /// `None` when no watchdog is configured for this process or the
    /// notifier is disabled.
    pub fn spawn_watchdog(&self, token: CancellationToken) -> Option<JoinHandle<()>> {
        let interval = watchdog_interval()?;
        if !self.is_enabled() {
            debug!("Notifications disabled, watchdog keep-alive not started");
            return None;
        }
        Some(spawn_keepalive(self.clone(), interval, token))
    }
}

//! # sd-notify
//!
//! Tell the service manager about start-up completion, reloads, shutdown,
//! free-form status and errors, and keep its watchdog fed (the systemd
//! `sd_notify` protocol).
//!
//! ## Overview
//!
//! A [`Notifier`] is built once at start-up, usually with
//! [`Notifier::from_env`]. Every call opens a fresh datagram socket, sends
//! one message and closes it. When the process was not started by a service
//! manager every call succeeds without doing anything, so callers never need
//! to check first.
//!
//! Messages are `KEY=VALUE` lines joined by `\n` and always go out as a
//! single datagram. Newlines inside user-supplied text are replaced with
//! spaces.
//!
//! ## Environment Variables
//!
//! - `NOTIFY_SOCKET`: Datagram socket of the service manager (`@` prefix for
//!   the abstract namespace)
//! - `WATCHDOG_USEC`: Watchdog interval in microseconds
//! - `WATCHDOG_PID`: Process id the watchdog applies to
//!
//! ## Platform
//!
//! Notifications are only sent on Linux. Everywhere else every call is a
//! no-op that returns no error, and no watchdog interval is ever reported.

mod clock;
mod error;
mod message;
mod notifier;
mod transport;
mod watchdog;

pub use clock::{FixedClock, MonotonicClock, SystemMonotonicClock};
pub use error::NotifyError;
pub use message::{sanitize, Message};
pub use notifier::Notifier;
pub use transport::{NoopTransport, NotifyEndpoint, Transport};
#[cfg(unix)]
pub use transport::UnixDatagramTransport;
pub use watchdog::{
    recommended_ping_interval, spawn_keepalive, watchdog_interval, WatchdogEnv,
};

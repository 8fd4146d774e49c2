//! Reference service for socket activation and status notifications.
//!
//! Serves a greeting line on every socket the service manager passes in,
//! reports its lifecycle over `NOTIFY_SOCKET` and pings the watchdog when
//! `WatchdogSec=` is set. Runs as a `Type=notify-reload` unit:
//!
//! ```ini
//! [Service]
//! Type=notify-reload
//! ExecStart=/usr/bin/sd-demo --tls-cert /etc/sd-demo/cert.pem --tls-key /etc/sd-demo/key.pem
//! WatchdogSec=30
//! ```

#[cfg(unix)]
mod config;
#[cfg(unix)]
mod serve;
#[cfg(unix)]
mod service;
#[cfg(unix)]
mod shutdown;
#[cfg(unix)]
mod telemetry;
#[cfg(unix)]
mod tls;

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use clap::Parser;

    service::run(config::DemoConfig::parse()).await
}

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("sd-demo needs a Unix service manager to pass it sockets")
}

use std::io;

use thiserror::Error;

/// Errors that can occur while notifying the service manager.
///
/// None of these are retried; notifications are best effort.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Creating the socket or connecting to `NOTIFY_SOCKET` failed
    #[error("unable to open NOTIFY_SOCKET ({endpoint}): {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Writing the datagram failed
    #[error("failed to send message: {0}")]
    Send(#[source] io::Error),

    /// The kernel accepted only part of the datagram
    #[error("failed to send message: wrote {sent} of {len} bytes")]
    ShortWrite { sent: usize, len: usize },

    /// Reading `CLOCK_MONOTONIC` failed
    #[error("unable to get current monotonic time: {0}")]
    Clock(#[source] io::Error),
}

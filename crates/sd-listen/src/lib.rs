//! # sd-listen
//!
//! Socket activation support. The service manager pre-opens the sockets a
//! service listens on and passes them to the process as inherited file
//! descriptors, numbered consecutively from [`LISTEN_FDS_START`].
//!
//! ## Overview
//!
//! 1. [`inherited_fds`] discovers the descriptors from the environment,
//!    marks each one close-on-exec and hands over ownership
//! 2. [`open_listeners`] / [`open_packet_receivers`] turn them into tokio
//!    listeners or datagram sockets, tagged with their configured name
//! 3. [`open_tls_listeners`] additionally wraps every TCP listener with TLS
//!
//! A descriptor that cannot be converted does not stop the others: failures
//! are collected into [`ActivationErrors`] next to the sockets that worked.
//!
//! ## Environment Variables
//!
//! - `LISTEN_PID`: Process id the descriptors are meant for
//! - `LISTEN_FDS`: Number of inherited file descriptors (starting at fd 3)
//! - `LISTEN_FDNAMES`: Colon-separated names for each inherited fd
//!
//! ## Platform
//!
//! Descriptor discovery only happens on Linux. Everywhere else every call
//! is a no-op that yields an empty batch and no error.

mod batch;
mod error;
#[cfg(unix)]
mod fds;
#[cfg(unix)]
mod socket;
#[cfg(unix)]
mod tls;
#[cfg(not(unix))]
mod unsupported;

pub use batch::Activated;
pub use error::{ActivationError, ActivationErrors};
#[cfg(unix)]
pub use fds::{inherited_fds, ActivationEnv, InheritedFd, LISTEN_FDS_START};
#[cfg(unix)]
pub use socket::{
    listeners_from, open_listeners, open_packet_receivers, packet_receivers_from, ListenAddr,
    Listener, NamedListener, NamedReceiver, Receiver,
};
#[cfg(unix)]
pub use tls::{open_tls_listeners, wrap_tls, TlsListener};
#[cfg(not(unix))]
pub use unsupported::{
    inherited_fds, listeners_from, open_listeners, open_packet_receivers, open_tls_listeners,
    packet_receivers_from, wrap_tls, InheritedFd, Listener, NamedListener, NamedReceiver,
    Receiver, LISTEN_FDS_START,
};

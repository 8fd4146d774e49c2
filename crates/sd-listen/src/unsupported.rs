//! Socket activation outside Unix.
//!
//! No service manager passes descriptors here, so nothing is ever inherited
//! and every call returns an empty batch. The types mirror the Unix ones so
//! callers build unchanged; they have no values.

use std::sync::Arc;

use tokio_rustls::rustls::ServerConfig;
use tracing::debug;

use crate::batch::Activated;

pub const LISTEN_FDS_START: i32 = 3;

/// One descriptor handed over by the service manager. Never constructed.
#[derive(Debug)]
pub enum InheritedFd {}

impl InheritedFd {
    pub fn name(&self) -> &str {
        match *self {}
    }
}

/// A stream listener handed over by the service manager. Never constructed.
#[derive(Debug)]
pub enum Listener {}

impl Listener {
    pub fn network(&self) -> &'static str {
        match *self {}
    }
}

/// A datagram socket handed over by the service manager. Never constructed.
#[derive(Debug)]
pub enum Receiver {}

#[derive(Debug)]
pub struct NamedListener {
    pub name: String,
    pub listener: Listener,
}

#[derive(Debug)]
pub struct NamedReceiver {
    pub name: String,
    pub receiver: Receiver,
}

pub fn inherited_fds(_unset_env: bool) -> Vec<InheritedFd> {
    debug!("Socket activation is not available on this platform");
    Vec::new()
}

pub fn open_listeners() -> Activated<NamedListener> {
    listeners_from(inherited_fds(true))
}

pub fn open_packet_receivers() -> Activated<NamedReceiver> {
    packet_receivers_from(inherited_fds(true))
}

pub fn open_tls_listeners(config: Option<Arc<ServerConfig>>) -> Activated<NamedListener> {
    wrap_tls(open_listeners(), config)
}

pub fn listeners_from(fds: Vec<InheritedFd>) -> Activated<NamedListener> {
    match fds.into_iter().next() {
        Some(fd) => match fd {},
        None => Activated::default(),
    }
}

pub fn packet_receivers_from(fds: Vec<InheritedFd>) -> Activated<NamedReceiver> {
    match fds.into_iter().next() {
        Some(fd) => match fd {},
        None => Activated::default(),
    }
}

pub fn wrap_tls(
    activated: Activated<NamedListener>,
    _config: Option<Arc<ServerConfig>>,
) -> Activated<NamedListener> {
    activated
}

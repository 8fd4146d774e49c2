//! Wire format: `KEY=VALUE` fields joined by `\n`, sent as one datagram.
//!
//! Field names follow sd_notify(3):
//! <https://www.freedesktop.org/software/systemd/man/latest/sd_notify.html>

pub(crate) const READY: &str = "READY";
pub(crate) const RELOADING: &str = "RELOADING";
pub(crate) const STOPPING: &str = "STOPPING";
pub(crate) const STATUS: &str = "STATUS";
pub(crate) const ERRNO: &str = "ERRNO";
pub(crate) const MONOTONIC_USEC: &str = "MONOTONIC_USEC";
pub(crate) const EXTEND_TIMEOUT_USEC: &str = "EXTEND_TIMEOUT_USEC";
pub(crate) const MAINPID: &str = "MAINPID";
pub(crate) const WATCHDOG: &str = "WATCHDOG";

/// A notification composed of one or more fields.
///
/// Fields added to the same message reach the service manager together;
/// sending them as separate messages would make them unrelated events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    buf: Vec<u8>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value`. Newlines in `value` become spaces.
    pub fn field(mut self, key: &str, value: impl AsRef<[u8]>) -> Self {
        if !self.buf.is_empty() {
            self.buf.push(b'\n');
        }
        self.buf.extend_from_slice(key.as_bytes());
        self.buf.push(b'=');
        let start = self.buf.len();
        self.buf.extend_from_slice(value.as_ref());
        sanitize(&mut self.buf[start..]);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

/// Replace every `\n` with a space, in place.
///
/// A newline inside a value would be read as the start of another field.
pub fn sanitize(value: &mut [u8]) {
    for byte in value.iter_mut() {
        if *byte == b'\n' {
            *byte = b' ';
        }
    }
}

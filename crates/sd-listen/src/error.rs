use std::fmt;
use std::io;
#[cfg(not(unix))]
use std::os::raw::c_int as RawFd;
#[cfg(unix)]
use std::os::unix::io::RawFd;

use thiserror::Error;

/// Failure to turn one inherited descriptor into a usable socket.
#[derive(Debug, Error)]
pub enum ActivationError {
    /// The descriptor could not become a stream listener.
    #[error("unable to open listener ({name}, fd {fd}): {source}")]
    Listener {
        name: String,
        fd: RawFd,
        #[source]
        source: io::Error,
    },

    /// The descriptor could not become a datagram receiver.
    #[error("unable to open packet receiver ({name}, fd {fd}): {source}")]
    Receiver {
        name: String,
        fd: RawFd,
        #[source]
        source: io::Error,
    },
}

impl ActivationError {
    /// Name the service manager assigned to the failed descriptor.
    pub fn name(&self) -> &str {
        match self {
            Self::Listener { name, .. } | Self::Receiver { name, .. } => name,
        }
    }

    /// Descriptor number as it was inherited.
    pub fn fd(&self) -> RawFd {
        match self {
            Self::Listener { fd, .. } | Self::Receiver { fd, .. } => *fd,
        }
    }
}

/// Every conversion failure of one activation batch.
///
/// Displays as the individual messages joined by newlines.
#[derive(Debug, Default)]
pub struct ActivationErrors(Vec<ActivationError>);

impl ActivationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: ActivationError) {
        self.0.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ActivationError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<ActivationError> {
        self.0
    }
}

impl fmt::Display for ActivationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ActivationErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<Vec<ActivationError>> for ActivationErrors {
    fn from(errors: Vec<ActivationError>) -> Self {
        Self(errors)
    }
}

impl IntoIterator for ActivationErrors {
    type Item = ActivationError;
    type IntoIter = std::vec::IntoIter<ActivationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ActivationErrors {
    type Item = &'a ActivationError;
    type IntoIter = std::slice::Iter<'a, ActivationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

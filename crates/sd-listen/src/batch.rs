use crate::error::ActivationErrors;

/// Sockets converted from one activation batch, plus the descriptors that
/// could not be converted.
///
/// `sockets` keeps the order the descriptors were inherited in.
#[derive(Debug)]
pub struct Activated<T> {
    pub sockets: Vec<T>,
    pub errors: ActivationErrors,
}

impl<T> Activated<T> {
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty() && self.errors.is_empty()
    }

    /// All sockets, or every conversion error if any descriptor failed.
    ///
    /// Sockets that did convert are dropped (closed) on error; read the
    /// fields directly to keep serving on a partial batch.
    pub fn into_result(self) -> Result<Vec<T>, ActivationErrors> {
        if self.errors.is_empty() {
            Ok(self.sockets)
        } else {
            Err(self.errors)
        }
    }
}

impl<T> Default for Activated<T> {
    fn default() -> Self {
        Self {
            sockets: Vec::new(),
            errors: ActivationErrors::new(),
        }
    }
}

//! Monotonic time for `MONOTONIC_USEC`.

use std::fmt;
use std::io;
use std::time::Duration;

/// Source of `CLOCK_MONOTONIC` readings.
pub trait MonotonicClock: Send + Sync + fmt::Debug {
    /// Time since an arbitrary fixed point; never goes backwards.
    fn now(&self) -> io::Result<Duration>;
}

/// The kernel's `CLOCK_MONOTONIC`, the clock the service manager compares
/// `MONOTONIC_USEC` against. Unaffected by wall-clock changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMonotonicClock;

#[cfg(unix)]
impl MonotonicClock for SystemMonotonicClock {
    fn now(&self) -> io::Result<Duration> {
        // SAFETY: timespec is plain data and all-zero is a valid value; ts is
        // writable for the duration of the call.
        let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
        let result = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32))
    }
}

/// Without `CLOCK_MONOTONIC`, time since the first reading in this process.
#[cfg(not(unix))]
impl MonotonicClock for SystemMonotonicClock {
    fn now(&self) -> io::Result<Duration> {
        static ORIGIN: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
        Ok(ORIGIN.get_or_init(std::time::Instant::now).elapsed())
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub Duration);

impl MonotonicClock for FixedClock {
    fn now(&self) -> io::Result<Duration> {
        Ok(self.0)
    }
}

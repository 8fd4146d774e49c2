//! Descriptor inheritance from the service manager.
//!
//! Reads `LISTEN_PID`, `LISTEN_FDS` and `LISTEN_FDNAMES` (the systemd
//! `sd_listen_fds` protocol). Absent or mismatched state is not an error:
//! the process simply was not socket activated.

use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use tracing::{debug, info, warn};

/// First inherited descriptor number; 0, 1 and 2 stay stdin/stdout/stderr.
pub const LISTEN_FDS_START: RawFd = 3;

const ENV_LISTEN_PID: &str = "LISTEN_PID";
const ENV_LISTEN_FDS: &str = "LISTEN_FDS";
const ENV_LISTEN_FDNAMES: &str = "LISTEN_FDNAMES";

/// One descriptor handed over by the service manager.
///
/// Owns the descriptor: dropping it closes the fd.
#[derive(Debug)]
pub struct InheritedFd {
    fd: OwnedFd,
    name: String,
}

impl InheritedFd {
    pub fn new(fd: OwnedFd, name: impl Into<String>) -> Self {
        Self {
            fd,
            name: name.into(),
        }
    }

    /// Name from `LISTEN_FDNAMES`, or `LISTEN_FD_<fd>` when none was given.
    ///
    /// Not guaranteed to be unique: every socket of one `.socket` unit
    /// shares the unit's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_parts(self) -> (OwnedFd, String) {
        (self.fd, self.name)
    }
}

impl AsFd for InheritedFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for InheritedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Raw activation variables as found in the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationEnv {
    pub listen_pid: Option<String>,
    pub listen_fds: Option<String>,
    pub listen_fdnames: Option<String>,
}

impl ActivationEnv {
    /// Snapshot `LISTEN_PID`, `LISTEN_FDS` and `LISTEN_FDNAMES`.
    pub fn from_env() -> Self {
        Self {
            listen_pid: std::env::var(ENV_LISTEN_PID).ok(),
            listen_fds: std::env::var(ENV_LISTEN_FDS).ok(),
            listen_fdnames: std::env::var(ENV_LISTEN_FDNAMES).ok(),
        }
    }

    /// Remove the activation variables so child processes do not try to
    /// claim the same descriptors.
    pub fn unset() {
        std::env::remove_var(ENV_LISTEN_PID);
        std::env::remove_var(ENV_LISTEN_FDS);
        std::env::remove_var(ENV_LISTEN_FDNAMES);
    }

    /// Descriptor numbers and names meant for process `pid`.
    ///
    /// Empty when `LISTEN_PID` is absent, malformed or names another
    /// process, or when `LISTEN_FDS` is absent, malformed or zero.
    pub fn plan(&self, pid: u32) -> Vec<(RawFd, String)> {
        let Some(listen_pid) = self.listen_pid.as_deref() else {
            debug!("LISTEN_PID not set, process was not socket activated");
            return Vec::new();
        };
        match listen_pid.parse::<u32>() {
            Ok(expected) if expected == pid => {}
            Ok(expected) => {
                debug!(
                    expected,
                    pid,
                    "LISTEN_PID names another process, ignoring inherited fds"
                );
                return Vec::new();
            }
            Err(_) => {
                warn!(
                    value = listen_pid,
                    "LISTEN_PID is not a process id, ignoring inherited fds"
                );
                return Vec::new();
            }
        }

        let count = match self.listen_fds.as_deref().map(parse_count) {
            Some(Some(count)) => count,
            Some(None) => {
                warn!(
                    value = ?self.listen_fds,
                    "LISTEN_FDS is not a valid count, ignoring inherited fds"
                );
                return Vec::new();
            }
            None => return Vec::new(),
        };

        let names: Vec<&str> = self
            .listen_fdnames
            .as_deref()
            .unwrap_or_default()
            .split(':')
            .collect();

        (0..count)
            .map(|i| {
                let fd = LISTEN_FDS_START + i;
                let name = match names.get(i as usize) {
                    Some(name) if !name.is_empty() => (*name).to_string(),
                    _ => format!("LISTEN_FD_{}", fd),
                };
                (fd, name)
            })
            .collect()
    }
}

/// Parse `LISTEN_FDS`, rejecting counts that would run past the fd range.
fn parse_count(value: &str) -> Option<RawFd> {
    let count: RawFd = value.parse().ok()?;
    if count < 0 {
        return None;
    }
    LISTEN_FDS_START.checked_add(count)?;
    Some(count)
}

/// Take ownership of the descriptors the service manager passed to this
/// process.
///
/// Every returned descriptor is marked close-on-exec so it does not leak into
/// processes the service spawns. With `unset_env` the activation variables are
/// removed afterwards, whether or not anything was found.
///
/// Call this once, before any other code could open files: the descriptors
/// are consumed and cannot be discovered again. Slots that are not open file
/// descriptors are skipped with a warning.
#[cfg(target_os = "linux")]
pub fn inherited_fds(unset_env: bool) -> Vec<InheritedFd> {
    let env = ActivationEnv::from_env();
    if unset_env {
        ActivationEnv::unset();
    }

    env.plan(std::process::id())
        .into_iter()
        .filter_map(|(fd, name)| claim(fd, name))
        .collect()
}

/// Socket activation only exists on Linux; elsewhere nothing is inherited.
#[cfg(not(target_os = "linux"))]
pub fn inherited_fds(_unset_env: bool) -> Vec<InheritedFd> {
    Vec::new()
}

fn claim(fd: RawFd, name: String) -> Option<InheritedFd> {
    if let Err(err) = set_cloexec(fd) {
        warn!(fd, name = %name, error = %err, "Inherited fd is not open, skipping");
        return None;
    }

    info!(fd, name = %name, "Inherited fd from service manager");

    // SAFETY: fcntl succeeded so the fd is open, and the service manager
    // handed it to this process; nothing else in the process owns it.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };
    Some(InheritedFd { fd, name })
}

/// Set `FD_CLOEXEC`, keeping the other descriptor flags.
fn set_cloexec(fd: RawFd) -> std::io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    if flags & libc::FD_CLOEXEC != 0 {
        return Ok(());
    }
    let result = unsafe { libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) };
    if result < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pid: Option<&str>, fds: Option<&str>, names: Option<&str>) -> ActivationEnv {
        ActivationEnv {
            listen_pid: pid.map(str::to_string),
            listen_fds: fds.map(str::to_string),
            listen_fdnames: names.map(str::to_string),
        }
    }

    #[test]
    fn test_plan_numbers_from_three_with_names() {
        let plan = env(Some("42"), Some("3"), Some("http:https:admin")).plan(42);
        assert_eq!(
            plan,
            vec![
                (3, "http".to_string()),
                (4, "https".to_string()),
                (5, "admin".to_string()),
            ]
        );
    }

    #[test]
    fn test_plan_synthesizes_missing_and_empty_names() {
        let plan = env(Some("42"), Some("4"), Some("http::dns")).plan(42);
        assert_eq!(
            plan,
            vec![
                (3, "http".to_string()),
                (4, "LISTEN_FD_4".to_string()),
                (5, "dns".to_string()),
                (6, "LISTEN_FD_6".to_string()),
            ]
        );

        let plan = env(Some("42"), Some("2"), None).plan(42);
        assert_eq!(
            plan,
            vec![(3, "LISTEN_FD_3".to_string()), (4, "LISTEN_FD_4".to_string())]
        );
    }

    #[test]
    fn test_plan_ignores_extra_names() {
        let plan = env(Some("7"), Some("1"), Some("a:b:c")).plan(7);
        assert_eq!(plan, vec![(3, "a".to_string())]);
    }

    #[test]
    fn test_plan_pid_mismatch_or_missing_is_empty() {
        for count in ["0", "1", "5", "bogus"] {
            assert!(env(Some("41"), Some(count), None).plan(42).is_empty());
            assert!(env(None, Some(count), None).plan(42).is_empty());
            assert!(env(Some("forty-two"), Some(count), None).plan(42).is_empty());
            assert!(env(Some(""), Some(count), None).plan(42).is_empty());
        }
    }

    #[test]
    fn test_plan_bad_count_is_empty() {
        for count in [None, Some(""), Some("0"), Some("-1"), Some("two"), Some("2147483647")] {
            assert!(
                env(Some("42"), count, Some("a:b")).plan(42).is_empty(),
                "count {:?} should yield nothing",
                count
            );
        }
    }

    #[test]
    fn test_set_cloexec() {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        assert!(fd >= 0);

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };

        set_cloexec(fd).unwrap();

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);

        unsafe { libc::close(fd) };
    }

    #[test]
    fn test_claim_takes_ownership_and_marks_cloexec() {
        let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
        assert!(fd >= 0);
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        unsafe { libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) };

        let inherited = claim(fd, "http".to_string()).expect("open fd is claimed");
        assert_eq!(inherited.name(), "http");
        assert_eq!(inherited.as_raw_fd(), fd);

        let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
        assert_ne!(flags & libc::FD_CLOEXEC, 0);

        let (owned, name) = inherited.into_parts();
        assert_eq!(name, "http");
        assert_eq!(owned.as_raw_fd(), fd);
    }

    #[test]
    fn test_claim_skips_closed_fd() {
        assert!(claim(9999, "missing".to_string()).is_none());
    }

    // The only test that touches the process-wide LISTEN_* variables.
    #[cfg(target_os = "linux")]
    #[test]
    fn test_inherited_fds_unsets_env_even_when_not_activated() {
        let other_pid = std::process::id().wrapping_add(1);
        std::env::set_var(ENV_LISTEN_PID, other_pid.to_string());
        std::env::set_var(ENV_LISTEN_FDS, "2");
        std::env::set_var(ENV_LISTEN_FDNAMES, "a:b");

        assert!(inherited_fds(true).is_empty());

        assert!(std::env::var_os(ENV_LISTEN_PID).is_none());
        assert!(std::env::var_os(ENV_LISTEN_FDS).is_none());
        assert!(std::env::var_os(ENV_LISTEN_FDNAMES).is_none());

        // Second call sees the cleared environment.
        assert!(inherited_fds(true).is_empty());
    }
}

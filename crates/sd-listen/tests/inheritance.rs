//! Inheriting a real descriptor at fd 3, the way the service manager passes it.
//!
//! The test binary re-runs itself with a listener placed on fd 3 and the
//! `LISTEN_*` variables set; the child does the adoption and checks the
//! result, the parent only checks that the child passed.

#![cfg(target_os = "linux")]

use std::io;
use std::net::SocketAddr;
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use sd_listen::{open_listeners, ListenAddr, Listener, LISTEN_FDS_START};

const TEST_NAME: &str = "test_inherited_listener_round_trip";

/// Set in the re-executed child only.
const ENV_CHILD: &str = "SD_LISTEN_TEST_CHILD";
/// Address the inherited listener is bound to.
const ENV_ADDR: &str = "SD_LISTEN_TEST_ADDR";

#[test]
fn test_inherited_listener_round_trip() {
    if std::env::var_os(ENV_CHILD).is_some() {
        adopt_inherited_listener();
    } else {
        run_activated_child();
    }
}

/// Parent side: bind, hand the socket over at fd 3 and re-run this test.
fn run_activated_child() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let raw = listener.as_raw_fd();

    let mut command = Command::new(std::env::current_exe().unwrap());
    command
        .args(["--exact", TEST_NAME, "--nocapture", "--test-threads=1"])
        .env(ENV_CHILD, "1")
        .env(ENV_ADDR, addr.to_string())
        .env("LISTEN_FDS", "1")
        .env("LISTEN_FDNAMES", "web")
        .env_remove("LISTEN_PID");

    // SAFETY: only async-signal-safe calls between fork and exec.
    unsafe {
        command.pre_exec(move || {
            if libc::dup2(raw, LISTEN_FDS_START) < 0 {
                return Err(io::Error::last_os_error());
            }
            // dup2 onto the same number keeps FD_CLOEXEC, so clear it here.
            if libc::fcntl(LISTEN_FDS_START, libc::F_SETFD, 0) < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let output = command.output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "activated child failed\nstdout:\n{}\nstderr:\n{}",
        stdout,
        stderr
    );
    assert!(
        stdout.contains("adopted web over tcp"),
        "child did not adopt the listener\nstdout:\n{}",
        stdout
    );

    drop(listener);
}

/// Child side: claim fd 3 through the public API and check what came back.
fn adopt_inherited_listener() {
    // The parent cannot know the child's pid before exec.
    std::env::set_var("LISTEN_PID", std::process::id().to_string());
    let expected: SocketAddr = std::env::var(ENV_ADDR).unwrap().parse().unwrap();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let activated = open_listeners();
        let original_open = unsafe { libc::fcntl(LISTEN_FDS_START, libc::F_GETFD) } != -1;

        assert!(activated.errors.is_empty(), "{}", activated.errors);
        assert!(!original_open, "fd 3 is still open after conversion");
        for var in ["LISTEN_PID", "LISTEN_FDS", "LISTEN_FDNAMES"] {
            assert!(std::env::var_os(var).is_none(), "{} was not cleared", var);
        }

        assert_eq!(activated.sockets.len(), 1);
        let named = &activated.sockets[0];
        assert_eq!(named.name, "web");
        assert_eq!(named.listener.network(), "tcp");

        match named.listener.local_addr().unwrap() {
            ListenAddr::Inet(addr) => assert_eq!(addr, expected),
            other => panic!("unexpected address {}", other),
        }

        let Listener::Tcp(listener) = &named.listener else {
            panic!("expected a tcp listener");
        };
        assert_ne!(listener.as_raw_fd(), LISTEN_FDS_START);
        let (connected, accepted) =
            tokio::join!(tokio::net::TcpStream::connect(expected), listener.accept());
        let connected = connected.unwrap();
        let (_, peer) = accepted.unwrap();
        assert_eq!(peer, connected.local_addr().unwrap());

        println!("adopted {} over {}", named.name, named.listener.network());
    });

    // A second resolution finds nothing: the environment was consumed.
    assert!(open_listeners().is_empty());
}

//! Runtime configuration.
//!
//! spec.md has no config-file concept and neither does the teacher crate
//! for its broker daemon — flags are parsed once in `main` and threaded
//! down, mirroring `clippyd broker --ring-depth`/`--max-turn-size` feeding
//! `broker::state::RingConfig`. See SPEC_FULL.md §9.

use std::path::PathBuf;
use std::time::Duration;

/// Default socket path, pinned by spec.md §6.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/task_proxy";
/// Default slot table capacity, spec.md §3 ("nominally 16").
pub const DEFAULT_CAPACITY: usize = 16;
/// Default maximum request size including the terminating NUL, spec.md §3
/// ("nominally ~5 KiB"), matching the original's `REQUESTBUF_SIZE` of 5100.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 5100;
/// Default argument cap, spec.md §3/§4.2 ("nominally 16").
pub const DEFAULT_MAX_ARGS: usize = 16;
/// Default listen backlog hint, spec.md §6 ("nominally 32").
pub const DEFAULT_BACKLOG_HINT: u32 = 32;
/// Default grace period for in-flight connection tasks to finish on
/// `SIGTERM`/`SIGINT` before the event loop gives up waiting and aborts
/// them (SPEC_FULL.md §10, "graceful shutdown ... lets in-flight children
/// finish").
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Daemon configuration, threaded from CLI flags into [`crate::server::run`]
/// and from there into every spawned connection task.
#[derive(Debug, Clone)]
pub struct Config {
    /// Filesystem path of the Unix domain socket to bind.
    pub socket_path: PathBuf,
    /// Fixed capacity of the slot table — the maximum number of
    /// concurrently in-flight tasks.
    pub capacity: usize,
    /// Maximum request size in bytes, including the terminating NUL.
    pub max_request_bytes: usize,
    /// Maximum number of arguments accepted per request; extras are
    /// silently truncated (spec.md §4.2).
    pub max_args: usize,
    /// Informational listen-backlog hint. `tokio::net::UnixListener`
    /// cannot be told to use a backlog smaller than the OS default, so
    /// this value is documentation only — see DESIGN.md.
    pub backlog_hint: u32,
    /// How long `server::run` waits for in-flight connection tasks to
    /// finish on their own after `SIGTERM`/`SIGINT` before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            capacity: DEFAULT_CAPACITY,
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_args: DEFAULT_MAX_ARGS,
            backlog_hint: DEFAULT_BACKLOG_HINT,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

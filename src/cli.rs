//! Command-line argument definitions for both binaries, following the
//! teacher's `clap` derive style (`clippyctl`'s `Cli`/`Command`).

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{
    Config, DEFAULT_BACKLOG_HINT, DEFAULT_CAPACITY, DEFAULT_MAX_ARGS, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_SHUTDOWN_GRACE_SECS, DEFAULT_SOCKET_PATH,
};

/// Run the task proxy daemon.
#[derive(Parser)]
#[command(name = "taskproxyd", about = "Unix-socket task dispatch daemon")]
pub struct ServeArgs {
    /// Path to the Unix domain socket to bind.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// Maximum number of concurrently in-flight tasks.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    pub capacity: usize,

    /// Maximum request size in bytes, including the terminating NUL.
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,

    /// Maximum number of arguments accepted per request.
    #[arg(long, default_value_t = DEFAULT_MAX_ARGS)]
    pub max_args: usize,

    /// Informational listen-backlog hint (see DESIGN.md).
    #[arg(long, default_value_t = DEFAULT_BACKLOG_HINT)]
    pub backlog_hint: u32,

    /// Seconds to wait for in-flight connections to finish on their own
    /// after SIGTERM/SIGINT before aborting them.
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,
}

impl From<ServeArgs> for Config {
    fn from(args: ServeArgs) -> Self {
        Config {
            socket_path: args.socket_path,
            capacity: args.capacity,
            max_request_bytes: args.max_request_bytes,
            max_args: args.max_args,
            backlog_hint: args.backlog_hint,
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        }
    }
}

/// One-shot CLI client for manual testing against a running daemon.
#[derive(Parser)]
#[command(name = "taskproxyctl", about = "One-shot client for the task proxy daemon")]
pub struct ClientArgs {
    /// Path to the daemon's Unix domain socket.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    #[command(subcommand)]
    pub command: ClientCommand,
}

#[derive(Subcommand)]
pub enum ClientCommand {
    /// Spawn and wait for completion; print the decoded exit status.
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        argv: Vec<String>,
    },
    /// Spawn with stdout relayed back over the socket; print the bytes.
    Pipe {
        #[arg(trailing_var_arg = true, required = true)]
        argv: Vec<String>,
    },
    /// Spawn and return immediately; the daemon sends no reply.
    Nret {
        #[arg(trailing_var_arg = true, required = true)]
        argv: Vec<String>,
    },
}

//! Child process spawning — EXEC/PIPE/NRET dispatch disciplines.
//!
//! See SPEC_FULL.md §4.4. Spawns via [`tokio::process::Command`] rather
//! than a hand-rolled `fork`/`execvp`: unlike the teacher's PTY wrapper
//! (`pty::child::spawn_child`), this daemon needs no controlling terminal
//! or PTY allocation, so there is no reason to pay for `unsafe` fork/exec
//! plumbing. Every socket this process creates is `O_CLOEXEC` by default,
//! which is the rewrite's resolution to spec.md §9's second Open Question:
//! an EXEC/NRET child never inherits the client socket, so there is
//! nothing to explicitly close in a child branch that no longer exists.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::process::Stdio;

use tokio::net::UnixStream;
use tokio::process::{Child, Command};

use crate::protocol::{Discipline, Request};

/// Errors from building and spawning a child for a parsed request.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("request carried an empty argument vector")]
    EmptyArgv,
    #[error("argument contained a null byte: {0:?}")]
    NulByte(Vec<u8>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a successful launch: the spawned child, plus the client
/// socket the reaper should retain to deliver the status trailer
/// (`Some` for EXEC only; `None` for PIPE, whose socket was consumed as
/// the child's stdout, and NRET, whose socket was already closed).
pub struct Launched {
    pub child: Child,
    pub retained_client: Option<UnixStream>,
}

/// Fork/exec (§4.4) equivalent: spawn `request.argv[0]` with
/// `request.argv[1..]` as its arguments, wiring `client` according to
/// `request.discipline`.
pub fn launch(request: Request, client: UnixStream) -> Result<Launched, LaunchError> {
    if request.argv.is_empty() {
        return Err(LaunchError::EmptyArgv);
    }
    let args = to_os_args(&request.argv)?;

    let mut command = Command::new(&args[0]);
    command.args(&args[1..]);

    let retained_client = match request.discipline {
        // Parent retains the socket; status trailer follows at reap time.
        // Stdio stays at its default (inherited) — the child never sees
        // `client` at all, per the module doc comment above.
        Discipline::Exec => Some(client),
        // Child's stdout is the client socket; parent's copy is consumed.
        Discipline::Pipe => {
            let std_client = client.into_std()?;
            command.stdout(Stdio::from(std_client));
            None
        }
        // Parent closes its copy immediately; no status is ever returned.
        Discipline::Nret => {
            drop(client);
            None
        }
    };

    let child = command.spawn()?;
    Ok(Launched {
        child,
        retained_client,
    })
}

fn to_os_args(argv: &[Vec<u8>]) -> Result<Vec<std::ffi::OsString>, LaunchError> {
    argv.iter()
        .map(|a| {
            if a.contains(&0) {
                Err(LaunchError::NulByte(a.clone()))
            } else {
                Ok(OsStr::from_bytes(a).to_os_string())
            }
        })
        .collect()
}

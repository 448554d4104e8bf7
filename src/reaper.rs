//! Reaping — awaiting child exit and delivering the EXEC status trailer.
//!
//! spec.md §4.5's three manual steps (consume one `signalfd_siginfo`, loop
//! `waitpid(-1, WNOHANG)`, route the result by pid) are subsumed by
//! [`tokio::process::Child::wait`]: tokio's process reactor is itself the
//! signal-fd equivalent Design Notes §9 calls for, and the future already
//! resolves for the correct, specific child — there is no "wrong pid"
//! case to defend against the way the original's shared `waitpid(-1, ..)`
//! loop had to. See SPEC_FULL.md §4.5.

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::process::Child;

/// The 4-byte sentinel prefixing the EXEC status trailer (spec.md §6).
pub const STATUS_SENTINEL: [u8; 4] = *b"####";

/// Outcome reported to the event loop once a child has been reaped, so it
/// can release the slot (spec.md §4.5 step 2's `task_put`).
#[derive(Debug)]
pub struct Reaped {
    pub slot: usize,
    pub child_id: u32,
}

/// Wait for `child` to exit. If `retained_client` is `Some` (EXEC
/// discipline), write the fixed 8-byte status trailer to it — `####`
/// followed by the native-endian 32-bit raw wait status. A short or
/// failed write is logged and never retried (spec.md §4.5, §7); the slot
/// is released by the caller regardless of write outcome.
pub async fn reap(
    slot: usize,
    child_id: u32,
    mut child: Child,
    retained_client: Option<UnixStream>,
) -> Reaped {
    let status = child.wait().await;

    match (retained_client, status) {
        (Some(mut client), Ok(status)) => {
            use std::os::unix::process::ExitStatusExt;
            let raw = status.into_raw();
            let mut trailer = Vec::with_capacity(8);
            trailer.extend_from_slice(&STATUS_SENTINEL);
            trailer.extend_from_slice(&raw.to_ne_bytes());
            if let Err(e) = client.write_all(&trailer).await {
                tracing::warn!(slot, child_id, error = %e, "status trailer write failed");
            }
        }
        (Some(_), Err(e)) => {
            tracing::warn!(slot, child_id, error = %e, "wait failed for EXEC child");
        }
        (None, Err(e)) => {
            tracing::warn!(slot, child_id, error = %e, "wait failed for child");
        }
        (None, Ok(_)) => {}
    }

    Reaped { slot, child_id }
}

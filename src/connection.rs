//! Per-connection task — framed read, parse, launch, then continue as that
//! child's reaper.
//!
//! One spawned task performs four of spec.md's six components
//! (Client I/O, Request Parser, Child Launcher, Reaper) end-to-end for a
//! single accepted client, reporting only slot-table mutations back to
//! the event loop by message — see SPEC_FULL.md §4.6 "Connection task"
//! and the teacher's identical shape in `broker::connection`.
//!
//! Tasks are spawned onto a [`tokio::task::JoinSet`] owned by
//! `server::run` rather than via a bare `tokio::spawn`, so that graceful
//! shutdown (SPEC_FULL.md §10) can wait for every in-flight connection —
//! including its EXEC/PIPE reaper tail — to finish before the daemon
//! exits.

use bytes::BytesMut;
use futures::StreamExt;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::codec::FramedRead;

use crate::config::Config;
use crate::launcher::{self, Launched};
use crate::protocol::{self, RequestCodec};
use crate::reaper::{self, Reaped};

/// A slot-table mutation requested by a connection task.
#[derive(Debug)]
pub enum SlotEvent {
    /// A request was parsed and a child launched: `Reading -> Launched`.
    Launched {
        slot: usize,
        child_id: u32,
        retains_client: bool,
    },
    /// The slot should be released with no child ever launched: framing
    /// error, protocol error, spawn failure, or a clean disconnect with
    /// nothing to dispatch.
    Free { slot: usize },
    /// A previously launched child has finished and been reaped.
    Reaped(Reaped),
}

/// Spawn, onto `tasks`, the task that owns `stream` for the duration of
/// slot `slot`'s lifetime, reporting state transitions on `events`.
pub fn spawn(
    tasks: &mut JoinSet<()>,
    slot: usize,
    stream: UnixStream,
    config: Config,
    events: mpsc::UnboundedSender<SlotEvent>,
) {
    tasks.spawn(async move {
        run(slot, stream, &config, &events).await;
    });
}

async fn run(slot: usize, stream: UnixStream, config: &Config, events: &mpsc::UnboundedSender<SlotEvent>) {
    let codec = RequestCodec::new(config.max_request_bytes);
    let mut framed = FramedRead::new(stream, codec);

    let frame: BytesMut = match framed.next().await {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
            tracing::warn!(slot, error = %e, "framing error");
            let _ = events.send(SlotEvent::Free { slot });
            return;
        }
        None => {
            // Clean disconnect before any bytes formed a frame.
            let _ = events.send(SlotEvent::Free { slot });
            return;
        }
    };

    let request = match protocol::parse(&frame, config.max_args) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(slot, error = %e, "rejected request");
            let _ = events.send(SlotEvent::Free { slot });
            return;
        }
    };
    let discipline = request.discipline;

    // Deregistering from the framed reader hands the raw stream back —
    // the edge-triggered multiplexer registration from spec.md §4.3's
    // "Completion actions" has no separate step here: dropping `framed`
    // is simply ceasing to poll it.
    let stream = framed.into_inner();

    let Launched {
        child,
        retained_client,
    } = match launcher::launch(request, stream) {
        Ok(launched) => launched,
        Err(e) => {
            tracing::warn!(slot, error = %e, "launch failed");
            let _ = events.send(SlotEvent::Free { slot });
            return;
        }
    };

    let child_id = child.id().expect("freshly spawned child has a pid");
    let retains_client = retained_client.is_some();
    tracing::debug!(slot, child_id, ?discipline, "child launched");

    if events
        .send(SlotEvent::Launched {
            slot,
            child_id,
            retains_client,
        })
        .is_err()
    {
        return; // Event loop is gone; nothing left to report to.
    }

    let reaped = reaper::reap(slot, child_id, child, retained_client).await;
    let _ = events.send(SlotEvent::Reaped(reaped));
}

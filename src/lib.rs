//! Unix-domain-socket task dispatch daemon.
//!
//! A single-process admission layer that accepts short textual command
//! requests over a local Unix socket, spawns child processes to run them
//! under one of three dispatch disciplines (EXEC, PIPE, NRET), and streams
//! child output or exit status back to the originating client. See
//! `SPEC_FULL.md` for the full component breakdown and `DESIGN.md` for the
//! grounding ledger.
//!
//! Two binaries consume this library: `taskproxyd` (the daemon) and
//! `taskproxyctl` (a one-shot CLI client for manual testing).

pub mod cli;
pub mod client;
pub mod config;
pub mod connection;
pub mod launcher;
pub mod protocol;
pub mod reaper;
pub mod server;
pub mod slots;

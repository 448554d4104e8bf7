//! One-shot CLI client — connect, send one framed request, print the reply.
//!
//! Ambient addition (SPEC_FULL.md §10): spec.md's original C program has
//! no companion client at all. Shaped after the teacher's own `client`
//! module (`clippyd client <action>`: connect, perform one operation,
//! print, exit) but reduced to the three wire commands this protocol
//! actually has.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::cli::ClientCommand;
use crate::protocol::DELIMITER;
use crate::reaper::STATUS_SENTINEL;

/// Client-side errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("daemon closed the connection without a complete status trailer")]
    TruncatedTrailer,
}

/// Run one client action against the daemon at `socket_path`.
pub async fn run(socket_path: &Path, command: ClientCommand) -> Result<(), ClientError> {
    let (tag, argv): (&[u8], Vec<String>) = match command {
        ClientCommand::Exec { argv } => (b"exec", argv),
        ClientCommand::Pipe { argv } => (b"pipe", argv),
        ClientCommand::Nret { argv } => (b"nret", argv),
    };

    let mut stream = UnixStream::connect(socket_path).await?;
    stream.write_all(&encode_request(tag, &argv)).await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;

    if reply.is_empty() {
        return Ok(());
    }
    if reply.starts_with(&STATUS_SENTINEL) {
        print_status_trailer(&reply)
    } else {
        use std::io::Write;
        std::io::stdout().write_all(&reply).ok();
        Ok(())
    }
}

fn encode_request(tag: &[u8], argv: &[String]) -> Vec<u8> {
    let mut frame = Vec::from(tag);
    for arg in argv {
        frame.push(DELIMITER);
        frame.extend_from_slice(arg.as_bytes());
    }
    frame.push(0);
    frame
}

fn print_status_trailer(reply: &[u8]) -> Result<(), ClientError> {
    if reply.len() < 8 {
        return Err(ClientError::TruncatedTrailer);
    }
    let raw = i32::from_ne_bytes(reply[4..8].try_into().expect("checked length"));
    use std::os::unix::process::ExitStatusExt;
    let status = std::process::ExitStatus::from_raw(raw);
    match status.code() {
        Some(code) => println!("exit status: {code}"),
        None => println!("terminated by signal: {:?}", status.signal()),
    }
    Ok(())
}

//! Request framing, command-tag classification, and argument splitting.
//!
//! Wire format (spec.md §6): `<tag><delim><arg0><delim><arg1>...\0`, where
//! `<tag>` is exactly one of the three 4-byte literals `exec`/`pipe`/`nret`
//! and `<delim>` is the single byte `#`. A connection carries exactly one
//! such frame. See SPEC_FULL.md §4.2.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

/// Length of a command tag in bytes.
pub const COMMAND_TAG_LEN: usize = 4;
/// Argument delimiter byte.
pub const DELIMITER: u8 = b'#';

/// One of the three dispatch disciplines (spec.md §1, §4.4, Glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discipline {
    /// Spawn, wait, deliver a status trailer.
    Exec,
    /// Spawn with stdout wired to the client socket.
    Pipe,
    /// Spawn, do not wait, deliver nothing.
    Nret,
}

impl Discipline {
    fn classify(tag: &[u8]) -> Option<Self> {
        match tag {
            b"exec" => Some(Discipline::Exec),
            b"pipe" => Some(Discipline::Pipe),
            b"nret" => Some(Discipline::Nret),
            _ => None,
        }
    }
}

/// A parsed request: a discipline plus its bounded argument vector.
/// `argv[0]` is the program to execute; `argv[1..]` are its arguments,
/// matching `execvp(argv[0], argv)` conventions (spec.md §4.2).
#[derive(Debug)]
pub struct Request {
    pub discipline: Discipline,
    pub argv: Vec<Vec<u8>>,
}

/// Errors from parsing a complete, already-framed request.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("request shorter than the minimum frame length ({COMMAND_TAG_LEN} bytes)")]
    TooShort,
    #[error("unrecognized command tag")]
    UnknownTag,
}

/// Classify and split a raw frame — the bytes between connection start and
/// the terminating NUL, NUL itself excluded — into a [`Request`].
///
/// Mirrors spec.md's two-step `classify`/`split`: the first
/// [`COMMAND_TAG_LEN`] bytes select the discipline; the frame is then
/// split on [`DELIMITER`] and the first segment (the tag itself) is
/// discarded, with the remaining segments becoming `argv`, truncated
/// silently at `arg_cap`. Consecutive delimiters yield empty-string
/// arguments.
pub fn parse(frame: &[u8], arg_cap: usize) -> Result<Request, ParseError> {
    if frame.len() < COMMAND_TAG_LEN {
        return Err(ParseError::TooShort);
    }
    let discipline = Discipline::classify(&frame[..COMMAND_TAG_LEN]).ok_or(ParseError::UnknownTag)?;

    let argv: Vec<Vec<u8>> = frame
        .split(|&b| b == DELIMITER)
        .skip(1) // discard the command-tag segment
        .take(arg_cap)
        .map(|segment| segment.to_vec())
        .collect();

    Ok(Request { discipline, argv })
}

/// Errors from decoding the wire framing itself, before parsing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("request exceeds the maximum frame size of {0} bytes without a terminator")]
    Oversize(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decodes a single NUL-terminated request frame per connection.
///
/// A connection carries exactly one framed message (spec.md §6). Framing
/// rules (spec.md §4.3):
/// - A `\0` byte anywhere in the stream ends the frame; the `\0` itself is
///   consumed and excluded from the yielded bytes.
/// - If the peer closes without ever sending a `\0`, the bytes received so
///   far are treated as a completed frame (handled in [`decode_eof`]).
/// - If the frame grows to `max_len` bytes without a terminator, the
///   request is rejected as oversized — the client is expected to be
///   closed by the caller without spawning anything.
///
/// [`decode_eof`]: Decoder::decode_eof
#[derive(Debug)]
pub struct RequestCodec {
    max_len: usize,
}

impl RequestCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Decoder for RequestCodec {
    type Item = BytesMut;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(pos) = src.iter().position(|&b| b == 0) {
            let frame = src.split_to(pos);
            src.advance(1); // drop the NUL terminator itself
            return Ok(Some(frame));
        }
        if src.len() >= self.max_len {
            return Err(FrameError::Oversize(self.max_len));
        }
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Peer closed without a trailing NUL — the remainder is a
        // completed frame (spec.md §4.3).
        let len = src.len();
        Ok(Some(src.split_to(len)))
    }
}

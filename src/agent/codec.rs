//! Line-framed decoder for the agent's `stream-json` output.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving agent cannot force unbounded allocation, and turns each line
//! into typed [`Event`]s.
//!
//! Malformed input never ends the stream. Non-JSON diagnostics, blank lines,
//! invalid UTF-8 and overlong lines are logged and skipped; only a failure of
//! the underlying reader surfaces as an error. This matters because
//! [`tokio_util::codec::FramedRead`] stops yielding after the first decoder
//! error.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use agent_turnstile::agent::codec::EventCodec;
//!
//! let events = FramedRead::new(child_stdout, EventCodec::new());
//! ```

use std::collections::VecDeque;
use std::io::ErrorKind;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use super::event::{parse_line, Event};
use crate::{AppError, Result};

/// Maximum line length accepted from the agent: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Streaming decoder producing [`Event`]s from newline-delimited JSON.
#[derive(Debug)]
pub struct EventCodec {
    lines: LinesCodec,
    pending: VecDeque<Event>,
}

impl EventCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            pending: VecDeque::new(),
        }
    }

    fn absorb(&mut self, line: &str) {
        match parse_line(line) {
            Ok(events) => self.pending.extend(events),
            Err(err) => debug!(%err, "agent stream: skipping non-event line"),
        }
    }

    /// Shared loop for `decode` and `decode_eof`.
    fn next_with(
        &mut self,
        src: &mut BytesMut,
        step: fn(&mut LinesCodec, &mut BytesMut) -> std::result::Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<Event>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            match step(&mut self.lines, src) {
                Ok(Some(line)) => self.absorb(&line),
                Ok(None) => return Ok(None),
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!(
                        limit = self.lines.max_length(),
                        "agent stream: discarding overlong line"
                    );
                }
                Err(LinesCodecError::Io(err)) if err.kind() == ErrorKind::InvalidData => {
                    debug!(%err, "agent stream: skipping line with invalid utf-8");
                }
                Err(LinesCodecError::Io(err)) => return Err(AppError::Io(err.to_string())),
            }
        }
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventCodec {
    type Item = Event;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        self.next_with(src, LinesCodec::decode)
    }

    /// Flushes a trailing line that lacks a final newline.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        self.next_with(src, LinesCodec::decode_eof)
    }
}

/// Push-style wrapper over [`EventCodec`] for callers that hold raw chunks.
///
/// Feeding a byte sequence in any chunking yields the same events as
/// feeding it whole.
#[derive(Debug, Default)]
pub struct EventDecoder {
    codec: EventCodec,
    buf: BytesMut,
}

impl EventDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Event> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.codec.decode(&mut self.buf) {
            events.push(event);
        }
        events
    }

    /// Signal end of input, flushing any unterminated final line.
    #[must_use]
    pub fn finish(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = self.codec.decode_eof(&mut self.buf) {
            events.push(event);
        }
        events
    }
}

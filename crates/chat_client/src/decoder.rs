//! Line-oriented SSE decoding.
//!
//! Bytes arrive in chunks whose boundaries have nothing to do with line boundaries. The
//! [`StreamDecoder`] keeps the unfinished tail of the last chunk in a residual buffer and only
//! classifies a line once its terminating `\n` has been seen. Splitting happens on raw bytes, so a
//! UTF-8 sequence cut in half by the transport is reassembled before it is decoded.

use std::collections::VecDeque;

use futures::Stream;
use log::{debug, trace};
use serde_json::Value;

use crate::error::TransportError;
use crate::transport::ChunkSource;

/// Prefix of every event line.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One incremental piece of assistant text.
    Fragment(String),
    /// The stream is over; nothing after this is read.
    Complete,
    /// A `data:` line that could not be decoded. Carries the raw line.
    Malformed(String),
    /// The server reported a failure in-band; nothing after this is read.
    Failed(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete | StreamEvent::Failed(_))
    }
}

/// Synchronous residual-buffer state machine. One instance per exchange.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    residual: Vec<u8>,
    // Prefix of `residual` already known to hold no `\n`.
    scanned: usize,
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return the events of every line it completes.
    ///
    /// Once a terminal event has been produced the decoder ignores further input.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.residual.extend_from_slice(chunk);

        let mut consumed = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.residual[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            let terminal = classify_line(&self.residual[consumed..end], &mut events);
            consumed = end + 1;
            search_from = consumed;
            if terminal {
                self.finished = true;
                break;
            }
        }

        if self.finished {
            self.residual.clear();
            self.scanned = 0;
        } else {
            self.residual.drain(..consumed);
            self.scanned = self.residual.len();
        }
        events
    }

    /// Signal end of data from the transport.
    ///
    /// A leftover unterminated line is classified once. If no terminal event was seen, a
    /// synthetic [`StreamEvent::Complete`] closes the session.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }
        self.finished = true;

        let residual = std::mem::take(&mut self.residual);
        self.scanned = 0;
        if !residual.is_empty() && classify_line(&residual, &mut events) {
            return events;
        }

        debug!("Stream ended without a terminal frame, completing");
        events.push(StreamEvent::Complete);
        events
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes received but not yet resolved into a line.
    pub fn residual_len(&self) -> usize {
        self.residual.len()
    }
}

/// Classify one complete line, pushing its events. Returns whether the line ended the stream.
fn classify_line(raw: &[u8], events: &mut Vec<StreamEvent>) -> bool {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);

    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        if !line.is_empty() {
            trace!("Ignoring non-event line: {}", line);
        }
        return false;
    };

    if payload.trim() == DONE_SENTINEL {
        events.push(StreamEvent::Complete);
        return true;
    }

    let Some(frame) = parse_frame(payload) else {
        events.push(StreamEvent::Malformed(line.into_owned()));
        return false;
    };

    if let Some(error) = frame.error {
        if !frame.content.is_empty() {
            events.push(StreamEvent::Fragment(frame.content));
        }
        events.push(StreamEvent::Failed(error));
        return true;
    }

    if frame.done {
        if !frame.content.is_empty() {
            events.push(StreamEvent::Fragment(frame.content));
        }
        events.push(StreamEvent::Complete);
        return true;
    }

    events.push(StreamEvent::Fragment(frame.content));
    false
}

struct Frame {
    content: String,
    done: bool,
    error: Option<String>,
}

fn parse_frame(payload: &str) -> Option<Frame> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let content = value.get("content")?.as_str()?.to_string();
    let done = value.get("done").and_then(Value::as_bool).unwrap_or(false);
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .map(str::to_string);

    Some(Frame {
        content,
        done,
        error,
    })
}

/// Lazy event sequence over a [`ChunkSource`].
///
/// Chunks are pulled only when no decoded event is waiting, and never after a terminal event.
pub struct DecodeSession<S> {
    source: S,
    decoder: StreamDecoder,
    ready: VecDeque<StreamEvent>,
}

impl<S: ChunkSource> DecodeSession<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            decoder: StreamDecoder::new(),
            ready: VecDeque::new(),
        }
    }

    /// Next event in wire order, or `None` once the terminal event has been returned.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, TransportError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }
            if self.decoder.is_finished() {
                return Ok(None);
            }

            match self.source.next_chunk().await? {
                Some(chunk) => self.ready.extend(self.decoder.feed(&chunk)),
                None => self.ready.extend(self.decoder.finish()),
            }
        }
    }

    /// Adapt the session into a `Stream`. The stream ends after the terminal event or after
    /// the first transport error.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent, TransportError>> {
        futures::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            match session.next_event().await {
                Ok(Some(event)) => Some((Ok(event), Some(session))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }
}

//! Frame decoder for the council event stream
//!
//! Turns arbitrarily chunked response bytes into discrete event records.
//! Each record is carried by one `data: <json>` line; everything else on the
//! wire is ignored. A malformed line is dropped with a diagnostic and never
//! ends the stream.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use thiserror::Error;

/// Marker that prefixes every record line
pub const DATA_PREFIX: &str = "data: ";

const PREVIEW_CHARS: usize = 100;

/// One decoded server-sent record
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Value of the payload's `type` field
    pub event_type: String,
    /// The whole JSON object, `type` included
    pub payload: Value,
}

impl EventRecord {
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// Why a single `data:` line could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload has no string `type` field")]
    MissingType,
}

/// Incremental decoder over a rolling byte buffer.
///
/// Lines are split on raw bytes before any text decoding, so a multi-byte
/// character or a record split across chunks decodes the same as if it had
/// arrived in one piece.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to hold no newline
    scanned: usize,
    malformed: usize,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every record completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<EventRecord> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        while let Some(newline_pos) = self.next_newline() {
            let mut line = self.buffer.split_to(newline_pos + 1);
            line.truncate(newline_pos);
            self.scanned = 0;
            if let Some(record) = self.decode_line(&line) {
                records.push(record);
            }
        }
        self.scanned = self.buffer.len();
        records
    }

    /// Position of the first newline, searching only bytes not yet scanned
    fn next_newline(&self) -> Option<usize> {
        self.buffer
            .get(self.scanned..)?
            .iter()
            .position(|&b| b == b'\n')
            .map(|offset| self.scanned + offset)
    }

    /// Flush a final line that arrived without a trailing newline
    pub fn finish(mut self) -> Option<EventRecord> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    /// Number of `data:` lines dropped so far
    #[must_use]
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<EventRecord> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        let Ok(line) = std::str::from_utf8(raw) else {
            if raw.starts_with(DATA_PREFIX.as_bytes()) {
                self.reject(&String::from_utf8_lossy(raw), &FrameError::InvalidUtf8);
            }
            return None;
        };

        match parse_data_line(line)? {
            Ok(record) => Some(record),
            Err(e) => {
                self.reject(line, &e);
                None
            }
        }
    }

    fn reject(&mut self, line: &str, error: &FrameError) {
        self.malformed += 1;
        tracing::warn!(
            error = %error,
            line_preview = %preview(line),
            dropped = self.malformed,
            "Dropping malformed event frame"
        );
    }
}

/// Decode one line.
///
/// Returns `None` for lines that do not carry the data marker.
pub fn parse_data_line(line: &str) -> Option<Result<EventRecord, FrameError>> {
    let data = line.strip_prefix(DATA_PREFIX)?;
    Some(decode_payload(data))
}

fn decode_payload(data: &str) -> Result<EventRecord, FrameError> {
    let payload: Value = serde_json::from_str(data)?;
    let event_type = payload
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();
    Ok(EventRecord {
        event_type,
        payload,
    })
}

fn preview(line: &str) -> String {
    line.chars().take(PREVIEW_CHARS).collect()
}

/// Lazily decode a byte stream into event records.
///
/// The output ends when the input ends. A transport error is forwarded once
/// and then the output ends as well; records already buffered ahead of the
/// error are yielded first.
pub fn decode_frames<S, E>(bytes: S) -> impl Stream<Item = Result<EventRecord, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    struct DecodeState<S> {
        bytes: S,
        decoder: Option<FrameDecoder>,
        ready: VecDeque<EventRecord>,
    }

    let initial = DecodeState {
        bytes,
        decoder: Some(FrameDecoder::new()),
        ready: VecDeque::new(),
    };

    stream::unfold(initial, |mut state| async move {
        loop {
            if let Some(record) = state.ready.pop_front() {
                return Some((Ok(record), state));
            }

            let decoder = state.decoder.as_mut()?;

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.ready.extend(decoder.push(&chunk));
                }
                Some(Err(e)) => {
                    state.decoder = None;
                    return Some((Err(e), state));
                }
                None => {
                    let tail = state.decoder.take().and_then(FrameDecoder::finish);
                    state.ready.extend(tail);
                }
            }
        }
    })
}

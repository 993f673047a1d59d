//! Chat stream handling
//!
//! Converts the newline-delimited JSON byte stream of a chat-completion
//! response into an append-only accumulated assistant message, reporting
//! progress after every usable record.

use std::time::Instant;

use log::{debug, warn};
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use super::types::ChatChunk;
use crate::util::errors::TransportError;

/// Progress snapshot emitted after every content fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProgress {
    /// Assistant text accumulated so far.
    pub text: String,
    /// Wall-clock seconds since the stream started.
    pub elapsed_seconds: f64,
    /// Characters emitted per second over the whole stream so far.
    pub chars_per_second: f64,
}

/// How a chat stream settled.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamOutcome {
    /// The stream ran to completion; carries the full assistant message.
    Completed(String),
    /// The caller's cancellation token fired mid-stream.
    Aborted,
}

/// Incremental decoder for the newline-delimited chat response stream.
///
/// Bytes go in via [`push_chunk`](Self::push_chunk); a record boundary is
/// a newline, and a record split across chunk boundaries is buffered
/// until its newline arrives, so fragments are never dropped or
/// double-counted. Framing happens on raw bytes, which also keeps UTF-8
/// sequences split across chunks intact. A malformed record is logged
/// and skipped; one bad line must not lose the rest of the response.
pub struct ChatStreamDecoder {
    buffer: Vec<u8>,
    text: String,
    chars_emitted: usize,
    started: Instant,
    done: bool,
}

impl ChatStreamDecoder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            text: String::new(),
            chars_emitted: 0,
            started: Instant::now(),
            done: false,
        }
    }

    /// Feed one chunk of raw bytes, returning a progress update for each
    /// content fragment completed by this chunk, in arrival order.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<StreamProgress> {
        self.buffer.extend_from_slice(chunk);

        let mut updates = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(progress) = self.take_record(&raw[..raw.len() - 1]) {
                updates.push(progress);
            }
            if self.done {
                break;
            }
        }
        updates
    }

    /// Whether the terminal record (`done: true`) has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The accumulated assistant message.
    pub fn into_text(self) -> String {
        self.text
    }

    fn take_record(&mut self, raw: &[u8]) -> Option<StreamProgress> {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("skipping non-UTF-8 stream record: {}", e);
                return None;
            }
        };
        if line.is_empty() {
            return None;
        }

        let chunk: ChatChunk = match serde_json::from_str(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("skipping malformed stream record: {}, line: {}", e, line);
                return None;
            }
        };

        if chunk.done {
            self.done = true;
        }

        let fragment = chunk.message?.content;
        if fragment.is_empty() {
            return None;
        }

        self.chars_emitted += fragment.chars().count();
        self.text.push_str(&fragment);
        Some(self.progress())
    }

    fn progress(&self) -> StreamProgress {
        let elapsed = self.started.elapsed().as_secs_f64();
        // Guard the very first fragment, where elapsed can round to zero.
        let chars_per_second = if elapsed > 0.0 {
            self.chars_emitted as f64 / elapsed
        } else {
            0.0
        };
        StreamProgress {
            text: self.text.clone(),
            elapsed_seconds: elapsed,
            chars_per_second,
        }
    }
}

impl Default for ChatStreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain a chat-completion response, invoking `on_progress` after every
/// content fragment.
///
/// Reads race the cancellation token: when the token fires, the response
/// is dropped without further reads, buffered partial input is
/// discarded, and the call settles as [`StreamOutcome::Aborted`] so the
/// caller can tell a user abort apart from a transport failure.
pub async fn handle_chat_stream(
    mut response: Response,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(StreamProgress),
) -> Result<StreamOutcome, TransportError> {
    let mut decoder = ChatStreamDecoder::new();

    loop {
        let maybe_chunk = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("chat stream aborted by caller");
                return Ok(StreamOutcome::Aborted);
            }
            chunk = response.chunk() => chunk?,
        };

        match maybe_chunk {
            Some(bytes) => {
                for progress in decoder.push_chunk(&bytes) {
                    on_progress(progress);
                }
                if decoder.is_done() {
                    break;
                }
            }
            None => break,
        }
    }

    Ok(StreamOutcome::Completed(decoder.into_text()))
}

//! Server-sent-events codec for the chat-completion wire format.
//!
//! Decode: bytes accumulate in a buffer, lines split on `\n`, and every
//! `data: ` payload is JSON-parsed — unparsable lines are dropped
//! silently, and the `[DONE]` sentinel terminates the stream.  Buffering
//! happens at the byte level so multi-byte UTF-8 sequences split across
//! network chunks reassemble correctly.
//!
//! Encode: one outbound chunk becomes one `data: <json>\n\n` frame; the
//! stream ends with `data: [DONE]\n\n`.

use serde_json::Value;

/// The `data: ` line prefix.
const DATA_PREFIX: &str = "data: ";

/// The stream-termination sentinel payload.
const DONE_SENTINEL: &str = "[DONE]";

// ── SseDecoder ─────────────────────────────────────────────────────────

/// Incremental SSE decoder.
///
/// Feed raw network chunks with [`SseDecoder::feed`]; each call returns
/// the JSON values completed by that chunk.  After the `[DONE]` sentinel
/// the decoder is closed and further input is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// A fresh decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume one network chunk and return the decoded values.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Value> {
        if self.done {
            return Vec::new();
        }

        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();

        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.trim();

            if line.is_empty() {
                continue;
            }

            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                // Comment lines, event names, ids: not ours to interpret.
                continue;
            };

            if payload == DONE_SENTINEL {
                self.done = true;
                self.buffer.clear();
                break;
            }

            // Malformed payloads are dropped, not fatal.
            if let Ok(value) = serde_json::from_str::<Value>(payload) {
                out.push(value);
            }
        }

        out
    }
}

// ── Encoding ───────────────────────────────────────────────────────────

/// Serialize one chunk as an SSE frame.
#[must_use]
pub fn format_frame(value: &Value) -> String {
    format!("{DATA_PREFIX}{value}\n\n")
}

/// The stream-termination frame.
#[must_use]
pub fn done_frame() -> &'static str {
    "data: [DONE]\n\n"
}

// ── Tests ──────────────────────────────────────────────────────────────

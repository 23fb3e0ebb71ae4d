//! Incremental decoder for Ollama's newline-delimited JSON responses.
//!
//! Network chunks do not line up with JSON lines, so raw bytes are buffered
//! until a `\n` arrives. Only complete lines are parsed; the unterminated
//! remainder stays in the buffer for the next chunk and is flushed once at end
//! of stream.

use serde::Deserialize;

/// One line of a streaming `/api/generate` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Longest unterminated line kept in memory before it is discarded.
pub const MAX_PENDING_BYTES: usize = 1024 * 1024;

#[derive(Debug)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    max_pending: usize,
    discarding: bool,
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::with_max_pending(MAX_PENDING_BYTES)
    }
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending(max_pending: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_pending,
            discarding: false,
        }
    }

    /// Feed raw bytes and return every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<GenerateChunk> {
        let mut out = Vec::new();
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (line_end, tail) = rest.split_at(pos + 1);
            rest = tail;
            if self.discarding {
                self.discarding = false;
                continue;
            }
            self.buffer.extend_from_slice(line_end);
            let line = std::mem::take(&mut self.buffer);
            if let Some(chunk) = parse_line(&line) {
                out.push(chunk);
            }
        }

        if !self.discarding {
            self.buffer.extend_from_slice(rest);
            if self.buffer.len() > self.max_pending {
                log::debug!(
                    "dropping stream line longer than {} bytes without a newline",
                    self.max_pending
                );
                self.buffer = Vec::new();
                self.discarding = true;
            }
        }
        out
    }

    /// Parse whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<GenerateChunk> {
        let rest = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<GenerateChunk> {
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerateChunk>(trimmed) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            log::debug!("dropping malformed stream line: {err}");
            None
        }
    }
}

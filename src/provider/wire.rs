//! Line-oriented wire formats spoken by the model server.
//!
//! * Server-sent events from `/v1/chat/completions` with `"stream": true`:
//!   `data: {json}` lines, terminated by `data: [DONE]`.
//! * Newline-delimited JSON from Ollama's `/api/pull`:
//!   `{"status": "...", "total": n, "completed": m}` per line.
//!
//! Both arrive as arbitrary byte chunks, so [`LineBuffer`] reassembles lines
//! across chunk boundaries before they are parsed.

use serde::Deserialize;

// ---------------------------------------------------------------------------
// LineBuffer
// ---------------------------------------------------------------------------

/// Reassembles `\n`-terminated lines from a byte stream.
///
/// Bytes are buffered until a newline arrives, so multi-byte UTF-8 sequences
/// split across chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completed, without terminators.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Return the unterminated tail, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string())
    }
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

/// One decoded SSE line from a streaming chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A content delta (may be empty for role-only deltas).
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
    /// Comments, blank keep-alive lines and non-data fields.
    Ignore,
}

#[derive(Deserialize)]
struct ChunkBody {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one SSE line.
///
/// Returns `Err` with a description when a `data:` payload is not valid JSON.
pub fn parse_sse_line(line: &str) -> Result<SseEvent, String> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignore);
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(SseEvent::Ignore);
    }
    if payload == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    let body: ChunkBody =
        serde_json::from_str(payload).map_err(|e| format!("bad stream chunk: {e}"))?;
    let content = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();
    Ok(SseEvent::Delta(content))
}

// ---------------------------------------------------------------------------
// Ollama pull progress
// ---------------------------------------------------------------------------

/// One decoded `/api/pull` progress line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PullStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub completed: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PullStatus {
    /// Fraction downloaded for layer-download lines, `None` otherwise.
    pub fn fraction(&self) -> Option<f64> {
        match (self.completed, self.total) {
            (Some(done), Some(total)) if total > 0 => Some(done as f64 / total as f64),
            _ => None,
        }
    }

    /// `true` for the final `{"status":"success"}` line.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Decode one NDJSON pull line.  Blank lines decode to `None`.
pub fn parse_pull_line(line: &str) -> Result<Option<PullStatus>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| format!("bad pull progress line: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

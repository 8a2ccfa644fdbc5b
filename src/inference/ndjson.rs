//! Incremental decoder for Ollama's newline-delimited JSON chat stream.
//!
//! Network reads can split a line, or a multi-byte UTF-8 sequence, anywhere. The decoder
//! buffers raw bytes and only parses complete lines.

use serde::Deserialize;

use crate::error::ChatError;

#[derive(Debug, Deserialize)]
struct Fragment {
    #[serde(default)]
    message: Option<FragmentMessage>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct FragmentMessage {
    #[serde(default)]
    content: String,
}

/// One decoded stream line.
#[derive(Debug, PartialEq)]
pub enum StreamItem {
    /// Incremental content. May be empty on keep-alive or final fragments.
    Delta(String),
    /// The upstream marked the stream finished.
    Done,
}

#[derive(Default)]
pub struct NdjsonDecoder {
    buf: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns one result per complete line.
    ///
    /// `Err(Protocol)` marks an unparsable line the caller may skip. `Err(Provider)` is an
    /// upstream-reported error.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamItem, ChatError>> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(item) = decode_line(&line) {
                out.extend(item);
            }
        }
        out
    }

    /// Decode whatever is left once the upstream closes without a trailing newline.
    pub fn finish(&mut self) -> Vec<Result<StreamItem, ChatError>> {
        let rest = std::mem::take(&mut self.buf);
        decode_line(&rest).into_iter().flatten().collect()
    }
}

fn decode_line(line: &[u8]) -> Option<Vec<Result<StreamItem, ChatError>>> {
    let text = match std::str::from_utf8(line) {
        Ok(t) => t.trim(),
        Err(e) => return Some(vec![Err(ChatError::Protocol(format!("invalid utf-8: {e}")))]),
    };
    if text.is_empty() {
        return None;
    }

    let fragment: Fragment = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => return Some(vec![Err(ChatError::Protocol(format!("{e}: {text}")))]),
    };

    if let Some(error) = fragment.error {
        return Some(vec![Err(ChatError::Provider(error))]);
    }

    let mut items = Vec::with_capacity(2);
    if let Some(message) = fragment.message {
        if !message.content.is_empty() {
            items.push(Ok(StreamItem::Delta(message.content)));
        }
    }
    if fragment.done {
        items.push(Ok(StreamItem::Done));
    }
    Some(items)
}

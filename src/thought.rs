//! Reasoning-span handling for model output.
//!
//! Models wrap their deliberation in `<think>...</think>`. Three views of that markup live here:
//!
//! - [`format_thinking`] rewrites a complete response for storage, wrapping each non-blank span
//!   in `*...*`.
//! - [`split_segments`] splits text into answer and thought segments with nesting-aware tag
//!   matching, for display of live or partial output.
//! - [`ThinkingTracker`] follows tag boundaries across streamed chunks and reports each toggle.
//!
//! The first two deliberately disagree on some inputs (see the tests); callers pick the one
//! matching their use.

pub const OPEN_TAG: &str = "<think>";
pub const CLOSE_TAG: &str = "</think>";

/// Rewrite a full model response for storage.
///
/// If the text opens a span but never closes one anywhere, the whole text (minus the first
/// opening tag) becomes a single emphasized thought. Otherwise tags are consumed left to right;
/// each span is trimmed and emitted as `*span*` unless it is blank, and an unterminated trailing
/// span is kept as a thought.
pub fn format_thinking(content: &str) -> String {
    if content.contains(OPEN_TAG) && !content.contains(CLOSE_TAG) {
        return format!("*{}*", content.replacen(OPEN_TAG, "", 1).trim());
    }

    let mut out = String::with_capacity(content.len());
    let mut thought = String::new();
    let mut thinking = false;
    let mut rest = content;

    while let Some(ch) = rest.chars().next() {
        if let Some(after) = rest.strip_prefix(OPEN_TAG) {
            thinking = true;
            rest = after;
            continue;
        }
        if let Some(after) = rest.strip_prefix(CLOSE_TAG) {
            thinking = false;
            flush_thought(&mut out, &mut thought);
            rest = after;
            continue;
        }

        if thinking {
            thought.push(ch);
        } else {
            flush_thought(&mut out, &mut thought);
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    flush_thought(&mut out, &mut thought);

    out
}

fn flush_thought(out: &mut String, thought: &mut String) {
    let trimmed = thought.trim();
    if !trimmed.is_empty() {
        out.push('*');
        out.push_str(trimmed);
        out.push('*');
    }
    thought.clear();
}

/// A piece of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Answer(String),
    Thought(String),
}

/// Split text into answer and thought segments.
///
/// Nested opening tags raise the depth; only the closing tag that returns depth to zero ends the
/// span, so inner tags stay inside the thought text. An opening tag with no match makes the rest
/// of the text a thought. Empty answer pieces are dropped.
pub fn split_segments(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = text;

    loop {
        let Some(start) = rest.find(OPEN_TAG) else {
            if !rest.is_empty() {
                segments.push(Segment::Answer(rest.to_string()));
            }
            break;
        };

        if start > 0 {
            segments.push(Segment::Answer(rest[..start].to_string()));
        }

        let body_start = start + OPEN_TAG.len();
        match matching_close(rest, body_start) {
            Some(end) => {
                segments.push(Segment::Thought(rest[body_start..end].trim().to_string()));
                rest = &rest[end + CLOSE_TAG.len()..];
            }
            None => {
                segments.push(Segment::Thought(rest[body_start..].trim().to_string()));
                break;
            }
        }
    }

    segments
}

/// Byte offset of the closing tag matching an opening tag whose body starts at `from`.
fn matching_close(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut i = from;
    while i < text.len() {
        let tail = &text[i..];
        if tail.starts_with(OPEN_TAG) {
            depth += 1;
            i += OPEN_TAG.len();
        } else if tail.starts_with(CLOSE_TAG) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
            i += CLOSE_TAG.len();
        } else {
            i += tail.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

/// Concatenated answer segments, thoughts removed.
pub fn answer_text(text: &str) -> String {
    split_segments(text)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Answer(a) => Some(a),
            Segment::Thought(_) => None,
        })
        .collect()
}

/// Tracks whether a chunked stream is currently inside a reasoning span.
///
/// Tags may be split across chunks; the unmatched tail of a chunk that could begin a tag is
/// carried into the next call.
#[derive(Debug, Default)]
pub struct ThinkingTracker {
    thinking: bool,
    carry: String,
}

impl ThinkingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Feed the next chunk; returns the new state after each boundary it completes, in order.
    pub fn feed(&mut self, chunk: &str) -> Vec<bool> {
        let mut text = std::mem::take(&mut self.carry);
        text.push_str(chunk);

        let mut toggles = Vec::new();
        let mut rest = text.as_str();
        loop {
            let tag = if self.thinking { CLOSE_TAG } else { OPEN_TAG };
            match rest.find(tag) {
                Some(pos) => {
                    self.thinking = !self.thinking;
                    toggles.push(self.thinking);
                    rest = &rest[pos + tag.len()..];
                }
                None => {
                    self.carry = partial_tag_suffix(rest, tag).to_string();
                    break;
                }
            }
        }
        toggles
    }
}

/// Longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix<'a>(text: &'a str, tag: &str) -> &'a str {
    for len in (1..tag.len()).rev() {
        if len > text.len() {
            continue;
        }
        let at = text.len() - len;
        if text.is_char_boundary(at) && tag.starts_with(&text[at..]) {
            return &text[at..];
        }
    }
    ""
}

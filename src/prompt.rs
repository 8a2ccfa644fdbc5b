//! Prompt assembly: system instruction, history, retrieved context and the title request.

use crate::history::types::{Message, ScoredMessage};
use crate::inference::{ChatMessage, ChatRole};
use crate::thought::{CLOSE_TAG, OPEN_TAG};

/// Stored message count (after the new user message) at which a title is generated.
pub const TITLE_TRIGGER_LEN: usize = 3;

pub const CONTEXT_HEADER: &str = "\nRelevant context from previous conversations:\n";

pub const TITLE_INSTRUCTION: &str = "Based on our conversation so far, generate a very brief and \
concise title (max 6 words). Respond with ONLY the title, no explanation or extra text.";

/// Formatting rules plus the reasoning-tag convention.
pub fn system_prompt() -> String {
    format!(
        "You are a helpful AI assistant. Answer the user's questions directly and format every \
reply as clean Markdown:

1. Spacing
   - Separate paragraphs with a blank line
   - Put a blank line before and after every list and code block
   - Indent nested content consistently

2. Markdown
   - ## for section headings
   - **bold** for emphasis, *italic* for secondary emphasis
   - `code` for technical terms and ``` fences for code blocks
   - > for quotes and [text](url) for links

3. Lists
   - - followed by a space for bullets, 1. followed by a space for numbered items
   - Keep each paragraph focused on one point

When you reason about the question before answering, wrap that reasoning in {OPEN_TAG} and \
{CLOSE_TAG} tags so it is shown separately from the answer."
    )
}

/// Render retrieved matches as the context addendum. Empty when there are no matches.
pub fn format_context(matches: &[ScoredMessage]) -> String {
    if matches.is_empty() {
        return String::new();
    }
    let body: Vec<&str> = matches.iter().map(|m| m.content.as_str()).collect();
    format!("{CONTEXT_HEADER}{}", body.join("\n"))
}

/// Build the outgoing prompt: system message, then history in order.
///
/// A non-empty `context` is appended to the content of the last history message; it is never
/// sent as a separate message, and is dropped when there is no history.
pub fn assemble(system: &str, history: &[Message], context: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(
        history
            .iter()
            .map(|m| ChatMessage::new(ChatRole::from(m.role), m.content.clone())),
    );

    if messages.len() > 1 && !context.is_empty() {
        if let Some(last) = messages.last_mut() {
            last.content.push_str(context);
        }
    }
    messages
}

/// Whether this turn should generate a conversation title.
///
/// `explicit_title` is a title sent with the request; `pinned` means the stored title is
/// already user-chosen or generated.
pub fn should_generate_title(explicit_title: bool, pinned: bool, history_len: usize) -> bool {
    !explicit_title && !pinned && history_len == TITLE_TRIGGER_LEN
}

/// The prompt for the title request: the turn's prompt plus the title instruction.
pub fn with_title_request(prompt: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = prompt.to_vec();
    messages.push(ChatMessage::user(TITLE_INSTRUCTION));
    messages
}

/// Clean a model-generated title; `None` if nothing usable remains.
pub fn clean_title(raw: &str) -> Option<String> {
    let answer = crate::thought::answer_text(raw);
    let title = answer.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    (!title.is_empty()).then(|| title.to_string())
}

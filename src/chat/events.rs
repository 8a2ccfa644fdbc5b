use serde::{Deserialize, Serialize};

/// Outbound stream events, serialized as `{"type": ..., ...}`.
///
/// A turn's stream ends with exactly one [`ChatEvent::Done`] or [`ChatEvent::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatEvent {
    /// Entered (`true`) or left (`false`) a reasoning span.
    Thinking { content: bool },
    /// Raw model text, forwarded verbatim.
    Chunk { content: String },
    Done {
        #[serde(rename = "conversationId")]
        conversation_id: String,
    },
    Error { error: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done { .. } | ChatEvent::Error { .. })
    }
}

/// Inbound chat request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model: String,
    /// Title for a new conversation. Suppresses auto-titling for this turn.
    #[serde(default)]
    pub title: Option<String>,
}

impl ChatRequest {
    /// Required fields must be present and non-blank.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.message.trim().is_empty() {
            return Err(crate::error::ChatError::Validation("message is required".into()));
        }
        if self.model.trim().is_empty() {
            return Err(crate::error::ChatError::Validation("model is required".into()));
        }
        Ok(())
    }

    /// Explicit, non-blank title from the request.
    pub fn explicit_title(&self) -> Option<&str> {
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

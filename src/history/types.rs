//! Record types for the conversation store.
//!
//! [`Conversation`] and [`Message`] mirror the `conversations` and `messages` tables.
//! [`ScoredMessage`] is a retrieval candidate produced by the similarity scan.

use serde::{Deserialize, Serialize};

/// Author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// A conversation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// UUID v7 primary key.
    pub id: String,
    pub title: String,
    /// `true` once the title was supplied by the user or generated; blocks auto-titling.
    pub title_pinned: bool,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last title change or appended message.
    pub updated_at: String,
}

/// A stored chat message. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    /// Post-processed text; reasoning spans are already wrapped in emphasis markers.
    pub content: String,
    pub created_at: String,
}

/// A conversation together with its ordered messages.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationWithMessages {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// A retrieval candidate with its (possibly boosted) similarity score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub content: String,
    pub score: f64,
}

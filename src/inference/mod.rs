//! Inference endpoint client.
//!
//! [`ChatModel`] is the seam the orchestrator talks to; [`ollama::OllamaClient`] is the
//! production implementation over Ollama's `/api/chat` and `/api/tags`.

pub mod ndjson;
pub mod ollama;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::history::types::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        }
    }
}

/// One entry of a prompt sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }
}

/// Incremental text deltas from a streaming completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An installed model as reported by the inference endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelSummary>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Non-streaming completion; returns the whole reply.
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;

    /// Streaming completion. Errors before the first byte are returned directly; later
    /// failures arrive as stream items.
    async fn stream(&self, model: &str, messages: &[ChatMessage]) -> Result<TokenStream>;

    async fn list_models(&self) -> Result<ModelList>;
}

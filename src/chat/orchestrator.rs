//! One chat turn, end to end.
//!
//! A turn runs as a producer task that pushes [`ChatEvent`]s into a bounded channel; the HTTP
//! layer (or the CLI) drains the receiver. Stages run strictly in order:
//!
//! resolve conversation, retrieve context, persist user message, embed user message,
//! build prompt, stream model, persist assistant message, embed assistant message,
//! maybe generate a title, done.
//!
//! Retrieval, embedding and titling degrade on failure. Everything else ends the turn with a
//! single `error` event; rows already written stay written.

use futures::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::events::{ChatEvent, ChatRequest};
use crate::config::ParleyConfig;
use crate::db;
use crate::embedding::EmbeddingProvider;
use crate::error::{ChatError, Result};
use crate::history::search::RetrievalParams;
use crate::history::types::Role;
use crate::history::{conversations, embeddings, messages, Store};
use crate::inference::{ChatMessage, ChatModel};
use crate::prompt;
use crate::retrieval::Retriever;
use crate::thought::{format_thinking, ThinkingTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStage {
    Validate,
    ResolveConversation,
    PersistUserMessage,
    BuildPrompt,
    StreamModel,
    PersistAssistantMessage,
}

impl fmt::Display for TurnStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::ResolveConversation => "resolve_conversation",
            Self::PersistUserMessage => "persist_user_message",
            Self::BuildPrompt => "build_prompt",
            Self::StreamModel => "stream_model",
            Self::PersistAssistantMessage => "persist_assistant_message",
        };
        f.write_str(name)
    }
}

struct TurnFailure {
    stage: TurnStage,
    source: ChatError,
}

fn at(stage: TurnStage) -> impl FnOnce(ChatError) -> TurnFailure {
    move |source| TurnFailure { stage, source }
}

/// Sends events to the client until the receiver goes away, then drops them silently.
///
/// A disconnected client does not cancel the turn; persistence still completes.
struct EventSink {
    tx: mpsc::Sender<ChatEvent>,
    connected: bool,
}

impl EventSink {
    fn new(tx: mpsc::Sender<ChatEvent>) -> Self {
        Self {
            tx,
            connected: true,
        }
    }

    async fn send(&mut self, event: ChatEvent) {
        if !self.connected {
            return;
        }
        if self.tx.send(event).await.is_err() {
            self.connected = false;
            tracing::debug!("client disconnected; finishing turn without streaming");
        }
    }
}

/// Runs chat turns against the shared store, model and embedder.
#[derive(Clone)]
pub struct ChatService {
    store: Store,
    model: Arc<dyn ChatModel>,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    system_prompt: Arc<str>,
    title_timeout: Duration,
    fallback_title: Arc<str>,
    event_buffer: usize,
}

impl ChatService {
    pub fn new(
        store: Store,
        model: Arc<dyn ChatModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &ParleyConfig,
    ) -> Self {
        let retriever = Retriever::new(
            store.clone(),
            Arc::clone(&embedder),
            RetrievalParams::from(&config.retrieval),
        );
        Self {
            store,
            model,
            embedder,
            retriever,
            system_prompt: prompt::system_prompt().into(),
            title_timeout: Duration::from_secs(config.inference.title_timeout_secs),
            fallback_title: config.chat.fallback_title.as_str().into(),
            event_buffer: config.chat.event_buffer.max(1),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn model(&self) -> &Arc<dyn ChatModel> {
        &self.model
    }

    /// Start a turn on a background task and return the event receiver.
    pub fn spawn_turn(&self, request: ChatRequest) -> mpsc::Receiver<ChatEvent> {
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let service = self.clone();
        tokio::spawn(async move {
            let _ = service.run_turn(request, tx).await;
        });
        rx
    }

    /// Run one turn, sending events to `tx`. Returns the conversation id on success.
    ///
    /// The terminal `done` or `error` event has already been sent when this returns.
    #[tracing::instrument(
        skip_all,
        fields(model = %request.model, conversation_id = request.conversation_id.as_deref().unwrap_or("new"))
    )]
    pub async fn run_turn(&self, request: ChatRequest, tx: mpsc::Sender<ChatEvent>) -> Result<String> {
        let mut sink = EventSink::new(tx);
        match self.execute(&request, &mut sink).await {
            Ok(conversation_id) => {
                tracing::info!(conversation_id = %conversation_id, "chat turn complete");
                sink.send(ChatEvent::Done {
                    conversation_id: conversation_id.clone(),
                })
                .await;
                Ok(conversation_id)
            }
            Err(TurnFailure { stage, source }) => {
                tracing::error!(stage = %stage, error = %source, "chat turn failed");
                sink.send(ChatEvent::Error {
                    error: source.to_string(),
                })
                .await;
                Err(source)
            }
        }
    }

    async fn execute(
        &self,
        request: &ChatRequest,
        sink: &mut EventSink,
    ) -> std::result::Result<String, TurnFailure> {
        request.validate().map_err(at(TurnStage::Validate))?;
        let explicit_title = request.explicit_title().is_some();

        let (conversation_id, pinned) = self
            .resolve_conversation(request)
            .await
            .map_err(at(TurnStage::ResolveConversation))?;

        let (query_embedding, context) = match self
            .retriever
            .find_similar(&request.message, Some(&conversation_id))
            .await
        {
            Ok(retrieval) => (
                Some(retrieval.query_embedding),
                prompt::format_context(&retrieval.matches),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "context retrieval failed; continuing without context");
                (None, String::new())
            }
        };

        let user_message = {
            let id = conversation_id.clone();
            let content = request.message.clone();
            self.store
                .call(move |conn| messages::insert_message(conn, &id, Role::User, &content))
                .await
                .map_err(at(TurnStage::PersistUserMessage))?
        };

        self.embed_and_store(&user_message.id, &request.message, query_embedding)
            .await;

        let history = {
            let id = conversation_id.clone();
            self.store
                .call(move |conn| messages::list_messages(conn, &id))
                .await
                .map_err(at(TurnStage::BuildPrompt))?
        };
        let generate_title = prompt::should_generate_title(explicit_title, pinned, history.len());
        let prompt_messages = prompt::assemble(&self.system_prompt, &history, &context);

        let raw_response = self
            .stream_model(&request.model, &prompt_messages, sink)
            .await
            .map_err(at(TurnStage::StreamModel))?;

        let stored = format_thinking(&raw_response);
        let assistant_message = {
            let id = conversation_id.clone();
            let content = stored.clone();
            self.store
                .call(move |conn| messages::insert_message(conn, &id, Role::Assistant, &content))
                .await
                .map_err(at(TurnStage::PersistAssistantMessage))?
        };

        if stored.trim().is_empty() {
            tracing::debug!("assistant reply is blank; skipping embedding");
        } else {
            self.embed_and_store(&assistant_message.id, &stored, None).await;
        }

        if generate_title {
            self.apply_generated_title(&conversation_id, &request.model, &prompt_messages)
                .await;
        }

        Ok(conversation_id)
    }

    /// Returns `(conversation_id, title_pinned)`.
    async fn resolve_conversation(&self, request: &ChatRequest) -> Result<(String, bool)> {
        if let Some(id) = request.conversation_id.as_deref().filter(|id| !id.is_empty()) {
            let lookup = id.to_string();
            let conversation = self
                .store
                .call(move |conn| conversations::get_conversation(conn, &lookup))
                .await?
                .ok_or_else(|| ChatError::NotFound(format!("conversation {id}")))?;
            return Ok((conversation.id, conversation.title_pinned));
        }

        let (title, pinned) = match request.explicit_title() {
            Some(title) => (title.to_string(), true),
            None => (placeholder_title(), false),
        };
        let stored_title = title.clone();
        let id = self
            .store
            .call(move |conn| conversations::create_conversation(conn, &stored_title, pinned))
            .await?;
        tracing::info!(conversation_id = %id, title = %title, "created conversation");
        Ok((id, pinned))
    }

    /// Stream the reply to the client and return the accumulated raw text.
    async fn stream_model(
        &self,
        model: &str,
        prompt_messages: &[ChatMessage],
        sink: &mut EventSink,
    ) -> Result<String> {
        let mut stream = self.model.stream(model, prompt_messages).await?;
        let mut tracker = ThinkingTracker::new();
        let mut full = String::new();

        while let Some(item) = stream.next().await {
            let chunk = item?;
            if chunk.is_empty() {
                continue;
            }
            for thinking in tracker.feed(&chunk) {
                sink.send(ChatEvent::Thinking { content: thinking }).await;
            }
            full.push_str(&chunk);
            sink.send(ChatEvent::Chunk { content: chunk }).await;
        }

        tracing::debug!(response_len = full.len(), "model stream finished");
        Ok(full)
    }

    /// Store an embedding for a message, computing it unless `precomputed` is given.
    /// Failures are logged and swallowed.
    async fn embed_and_store(&self, message_id: &str, text: &str, precomputed: Option<Vec<f32>>) {
        let vector = match precomputed {
            Some(v) => v,
            None => match self.embedder.embed(text).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(message_id, error = %e, "embedding failed; message stored without one");
                    return;
                }
            },
        };

        let id = message_id.to_string();
        let model = self.embedder.model().to_string();
        if let Err(e) = self
            .store
            .call(move |conn| {
                embeddings::insert_embedding(conn, &id, &vector)?;
                if db::migrations::claim_embedding_model(conn, &model)? {
                    tracing::info!(model = %model, "recorded embedding model");
                }
                Ok(())
            })
            .await
        {
            tracing::warn!(message_id, error = %e, "failed to store embedding");
        }
    }

    async fn apply_generated_title(&self, conversation_id: &str, model: &str, prompt_messages: &[ChatMessage]) {
        let title = self.generate_title(model, prompt_messages).await;
        let id = conversation_id.to_string();
        let stored_title = title.clone();
        match self
            .store
            .call(move |conn| conversations::set_generated_title(conn, &id, &stored_title))
            .await
        {
            Ok(true) => tracing::info!(conversation_id, title = %title, "conversation titled"),
            Ok(false) => tracing::debug!(conversation_id, "title already set; skipping"),
            Err(e) => tracing::warn!(conversation_id, error = %e, "failed to store title"),
        }
    }

    async fn generate_title(&self, model: &str, prompt_messages: &[ChatMessage]) -> String {
        let request = prompt::with_title_request(prompt_messages);
        match tokio::time::timeout(self.title_timeout, self.model.complete(model, &request)).await {
            Ok(Ok(raw)) => prompt::clean_title(&raw).unwrap_or_else(|| self.fallback_title.to_string()),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "title generation failed");
                self.fallback_title.to_string()
            }
            Err(_) => {
                tracing::warn!(timeout_secs = self.title_timeout.as_secs(), "title generation timed out");
                self.fallback_title.to_string()
            }
        }
    }
}

/// Title for a conversation started without one.
fn placeholder_title() -> String {
    format!(
        "Chat started at {}",
        chrono::Local::now().format("%-m/%-d/%Y, %-I:%M:%S %p")
    )
}

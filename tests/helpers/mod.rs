#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use parley::chat::{ChatEvent, ChatService};
use parley::config::ParleyConfig;
use parley::embedding::EmbeddingProvider;
use parley::error::{ChatError, Result};
use parley::history::Store;
use parley::inference::{ChatMessage, ChatModel, ModelList, ModelSummary, TokenStream};

pub const DIMS: usize = 8;

pub fn test_store() -> Store {
    Store::open_in_memory().unwrap()
}

/// Unit vector of `dims` dimensions with a spike at `seed`.
pub fn test_embedding(dims: usize, seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    v[seed % dims] = 1.0;
    v
}

/// Embedding provider that returns preset vectors per text, or a spike derived from the text.
pub struct FakeEmbedder {
    dims: usize,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(dims: usize) -> Self {
        let e = Self::new(dims);
        e.set_failing(true);
        e
    }

    pub fn with(self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChatError::Provider("embedding endpoint down".into()));
        }
        if let Some(v) = self.vectors.lock().unwrap().get(text) {
            return Ok(v.clone());
        }
        let seed = text.bytes().map(usize::from).sum::<usize>();
        Ok(test_embedding(self.dims, seed))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model(&self) -> &str {
        "fake-embedder"
    }
}

/// Chat model that replays scripted chunks and records every prompt it receives.
pub struct FakeModel {
    pub chunks: Vec<String>,
    /// Yield a provider error after this many chunks.
    pub fail_after: Option<usize>,
    /// Fail before the stream opens.
    pub fail_open: bool,
    /// Reply for non-streaming calls; `None` makes them fail.
    pub title: Option<String>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    pub completions: AtomicUsize,
}

impl FakeModel {
    pub fn replying(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            fail_after: None,
            fail_open: false,
            title: Some("Generated Title".into()),
            prompts: Mutex::new(Vec::new()),
            completions: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            fail_open: true,
            ..Self::replying(&[])
        }
    }

    pub fn prompts(&self) -> Vec<Vec<ChatMessage>> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeModel {
    async fn complete(&self, _model: &str, messages: &[ChatMessage]) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(messages.to_vec());
        self.title
            .clone()
            .ok_or_else(|| ChatError::Provider("title request failed".into()))
    }

    async fn stream(&self, _model: &str, messages: &[ChatMessage]) -> Result<TokenStream> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail_open {
            return Err(ChatError::Provider("connection refused".into()));
        }
        let mut items: Vec<Result<String>> = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            if self.fail_after == Some(i) {
                items.push(Err(ChatError::Provider("stream dropped".into())));
                break;
            }
            items.push(Ok(chunk.clone()));
        }
        if self.fail_after == Some(self.chunks.len()) {
            items.push(Err(ChatError::Provider("stream dropped".into())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn list_models(&self) -> Result<ModelList> {
        Ok(ModelList {
            models: vec![ModelSummary {
                name: "llama3.2".into(),
                modified_at: None,
                size: Some(2_000_000_000),
            }],
        })
    }
}

pub fn test_config() -> ParleyConfig {
    let mut config = ParleyConfig::default();
    config.inference.title_timeout_secs = 5;
    config
}

pub fn service(store: &Store, model: Arc<FakeModel>, embedder: Arc<FakeEmbedder>) -> ChatService {
    ChatService::new(store.clone(), model, embedder, &test_config())
}

/// Drain a turn's events until the channel closes.
pub async fn collect_events(mut rx: mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(
        events.last().is_some_and(ChatEvent::is_terminal),
        "stream did not end with done or error: {events:?}"
    );
    events
}

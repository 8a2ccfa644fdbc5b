//! Text-to-vector embedding pipeline.
//!
//! Provides the async [`EmbeddingProvider`] trait, two HTTP providers (an OpenAI-compatible
//! `/embeddings` endpoint and Ollama's `/api/embed`) and [`RetryingProvider`], which adds bounded
//! retry and dimension validation around either. Build one with [`create_provider`].

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{EmbeddingConfig, InferenceConfig};
use crate::error::{ChatError, Result};

/// Turns text into a fixed-dimension vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several strings. The default implementation calls [`embed`](Self::embed) in order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Model identifier, recorded in `schema_meta` by backfill.
    fn model(&self) -> &str;
}

/// Wraps a provider with exponential-backoff retry and a dimension check on every result.
pub struct RetryingProvider {
    inner: Arc<dyn EmbeddingProvider>,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingProvider {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        let vector = loop {
            match self.inner.embed(text).await {
                Ok(v) => break v,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying embedding");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let expected = self.inner.dimensions();
        if vector.len() != expected {
            return Err(ChatError::Provider(format!(
                "embedding has {} dimensions, expected {expected}",
                vector.len()
            )));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model(&self) -> &str {
        self.inner.model()
    }
}

/// Create the configured embedding provider, wrapped in [`RetryingProvider`].
///
/// `"openai"` talks to `embedding.base_url`; `"ollama"` talks to the inference host.
pub fn create_provider(
    config: &EmbeddingConfig,
    inference: &InferenceConfig,
) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    let inner: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "openai" => {
            if config.api_key.is_none() {
                tracing::warn!("no embedding API key configured; retrieval will be skipped");
            }
            Arc::new(openai::OpenAiEmbedder::new(client, config))
        }
        "ollama" => Arc::new(ollama::OllamaEmbedder::new(client, &inference.host, config)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: openai, ollama"),
    };

    tracing::info!(
        provider = %config.provider,
        model = %config.model,
        dimensions = config.dimensions,
        "embedding provider ready"
    );

    Ok(Arc::new(RetryingProvider::new(
        inner,
        config.max_retries,
        Duration::from_millis(config.retry_backoff_ms),
    )))
}

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use super::ndjson::{NdjsonDecoder, StreamItem};
use super::{ChatMessage, ChatModel, ModelList, TokenStream};
use crate::config::InferenceConfig;
use crate::error::{ChatError, Result};

/// HTTP client for a local Ollama server.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    host: String,
    idle_timeout: Option<Duration>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

struct StreamState {
    body: ByteStream,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<String>>,
    idle_timeout: Option<Duration>,
    finished: bool,
}

impl OllamaClient {
    pub fn new(config: &InferenceConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            idle_timeout: (config.stream_idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.stream_idle_timeout_secs)),
        })
    }

    async fn post_chat(&self, model: &str, messages: &[ChatMessage], stream: bool) -> Result<Response> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&ChatRequest {
                model,
                messages,
                stream,
            })
            .send()
            .await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ChatError::Provider(format!("inference endpoint returned HTTP {status}: {body}")))
}

/// Pull the next content delta, reading more bytes as needed.
///
/// Protocol errors are logged and skipped. Upstream errors, read errors and idle timeouts end
/// the stream after being yielded once.
async fn next_delta(mut state: StreamState) -> Option<(Result<String>, StreamState)> {
    loop {
        if let Some(item) = state.pending.pop_front() {
            return Some((item, state));
        }
        if state.finished {
            return None;
        }

        let read = match state.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, state.body.next()).await.map_err(|_| limit),
            None => Ok(state.body.next().await),
        };
        let decoded = match read {
            Err(limit) => {
                state.finished = true;
                let secs = limit.as_secs();
                return Some((
                    Err(ChatError::Provider(format!("no data from model for {secs}s"))),
                    state,
                ));
            }
            Ok(Some(Ok(chunk))) => state.decoder.push(&chunk),
            Ok(Some(Err(e))) => {
                state.finished = true;
                return Some((Err(ChatError::from(e)), state));
            }
            Ok(None) => {
                state.finished = true;
                state.decoder.finish()
            }
        };

        for item in decoded {
            match item {
                Ok(StreamItem::Delta(text)) => state.pending.push_back(Ok(text)),
                Ok(StreamItem::Done) => state.finished = true,
                Err(ChatError::Protocol(detail)) => {
                    tracing::debug!(%detail, "skipping malformed stream fragment");
                }
                Err(e) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let response = self.post_chat(model, messages, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Provider(format!("invalid chat response: {e}")))?;
        Ok(parsed.message.content)
    }

    async fn stream(&self, model: &str, messages: &[ChatMessage]) -> Result<TokenStream> {
        let response = self.post_chat(model, messages, true).await?;
        tracing::debug!(model, "model stream opened");
        let state = StreamState {
            body: Box::pin(response.bytes_stream()),
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            idle_timeout: self.idle_timeout,
            finished: false,
        };
        Ok(Box::pin(futures::stream::unfold(state, next_delta)))
    }

    async fn list_models(&self) -> Result<ModelList> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .send()
            .await?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| ChatError::Provider(format!("invalid model list: {e}")))
    }
}

//! Parley: a retrieval-augmented chat server for locally hosted language models.
//!
//! Each chat turn embeds the user's message, pulls semantically similar messages from earlier
//! conversations, and streams the model's reply back as server-sent events while tracking
//! `<think>` reasoning spans. Conversations, messages and embeddings are kept in SQLite.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec) providing the
//!   cosine distance used for retrieval
//! - **Embeddings**: any OpenAI-compatible `/embeddings` endpoint, or Ollama's `/api/embed`
//! - **Inference**: Ollama `/api/chat`, streamed as newline-delimited JSON
//! - **Transport**: axum HTTP with an SSE chat endpoint
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: database initialization, schema, migrations and health checks
//! - [`history`]: conversation store and similarity scan
//! - [`embedding`]: embedding providers with retry
//! - [`inference`]: model client and stream decoding
//! - [`retrieval`]: similarity retriever
//! - [`thought`]: reasoning-span parsing
//! - [`prompt`]: prompt and context assembly
//! - [`chat`]: turn orchestration and the outbound event protocol
//! - [`server`]: HTTP routes

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod history;
pub mod inference;
pub mod prompt;
pub mod retrieval;
pub mod server;
pub mod thought;

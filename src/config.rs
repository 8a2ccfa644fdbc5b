use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ParleyConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Local inference endpoint (Ollama-compatible `/api/chat`).
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    pub host: String,
    pub default_model: String,
    pub connect_timeout_secs: u64,
    /// Maximum wait for the next streamed fragment. `0` disables the idle timeout.
    pub stream_idle_timeout_secs: u64,
    pub title_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `"openai"` (any OpenAI-compatible `/embeddings` endpoint) or `"ollama"`.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub min_similarity: f64,
    pub top_k: usize,
    pub affinity_boost: f64,
    pub enforce_min_similarity: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    /// Capacity of the bounded channel between the turn producer and the SSE writer.
    pub event_buffer: usize,
    pub fallback_title: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_parley_dir()
            .join("chat.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".into(),
            default_model: "llama3.2".into(),
            connect_timeout_secs: 10,
            stream_idle_timeout_secs: 120,
            title_timeout_secs: 60,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "text-embedding-3-small".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            dimensions: 512,
            max_retries: 2,
            retry_backoff_ms: 250,
            timeout_secs: 30,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.75,
            top_k: 5,
            affinity_boost: 1.5,
            enforce_min_similarity: true,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            event_buffer: 32,
            fallback_title: "New Conversation".into(),
        }
    }
}

/// Returns `~/.parley/`
pub fn default_parley_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Returns the default config file path: `~/.parley/config.toml`
pub fn default_config_path() -> PathBuf {
    default_parley_dir().join("config.toml")
}

impl ParleyConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ParleyConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    /// (PARLEY_DB, PARLEY_LOG_LEVEL, PARLEY_OLLAMA_HOST, PARLEY_PORT, OPENAI_API_KEY).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PARLEY_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("PARLEY_OLLAMA_HOST") {
            self.inference.host = val;
        }
        if let Ok(val) = std::env::var("PARLEY_PORT") {
            match val.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!(value = %val, "ignoring invalid PARLEY_PORT"),
            }
        }
        if self.embedding.api_key.is_none() {
            if let Ok(val) = std::env::var("OPENAI_API_KEY") {
                self.embedding.api_key = Some(val);
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

//! HTTP surface: the streaming chat endpoint, conversation management, model listing and health.
//!
//! [`build_state`] wires the store, embedding provider and model client into an [`AppState`];
//! [`build_router`] mounts the handlers; [`serve`] runs both until Ctrl-C.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;

use crate::chat::{ChatRequest, ChatService};
use crate::config::ParleyConfig;
use crate::error::ChatError;
use crate::history::{conversations, Store};
use crate::inference::ollama::OllamaClient;
use crate::inference::ChatModel;
use crate::{db, embedding};

const DEFAULT_LIST_LIMIT: usize = 20;
const NEW_CONVERSATION_TITLE: &str = "New Conversation";

/// Shared handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatService,
    pub store: Store,
    pub model: Arc<dyn ChatModel>,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            store: chat.store().clone(),
            model: Arc::clone(chat.model()),
            chat,
        }
    }
}

/// Open the database and build the providers named in `config`.
pub async fn build_state(config: &ParleyConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let store = Store::open(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let configured = config.embedding.model.clone();
    let stored = store
        .call(|conn| Ok(db::migrations::get_embedding_model(conn)?))
        .await?;
    if let Some(stored) = stored.filter(|s| *s != configured) {
        tracing::warn!(
            stored = %stored,
            configured = %configured,
            "embedding model changed; run `parley backfill --all` to update stored vectors"
        );
    }

    let embedder = embedding::create_provider(&config.embedding, &config.inference)?;
    let model: Arc<dyn ChatModel> = Arc::new(OllamaClient::new(&config.inference)?);
    let chat = ChatService::new(store, model, embedder, config);
    Ok(AppState::new(chat))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route(
            "/api/conversations",
            get(get_conversations)
                .post(create_conversation)
                .put(rename_conversation)
                .delete(delete_conversation),
        )
        .route("/api/models", get(list_models))
        .route("/health", get(health))
        .with_state(state)
}

/// Run the HTTP server until Ctrl-C, then close the store.
pub async fn serve(config: ParleyConfig) -> Result<()> {
    let bind_addr = config.bind_addr();
    let state = build_state(&config).await?;
    let store = state.store.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening on http://{bind_addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close()?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// JSON error body with a status code.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        let status = match e {
            ChatError::Validation(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %e, "request failed");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[tracing::instrument(skip_all)]
async fn chat_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "malformed chat request");
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process chat message",
            )
            .into_response();
        }
    };
    if let Err(e) = request.validate() {
        return ApiError::from(e).into_response();
    }

    tracing::debug!(
        model = %request.model,
        message_len = request.message.len(),
        "chat request accepted"
    );

    let events = ReceiverStream::new(state.chat.spawn_turn(request))
        .map(|event| Event::default().json_data(event));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ConversationQuery {
    id: Option<String>,
    limit: Option<usize>,
}

#[tracing::instrument(skip(state))]
async fn get_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> Result<Response, ApiError> {
    if let Some(id) = query.id {
        let found = state
            .store
            .call(move |conn| conversations::get_conversation_with_messages(conn, &id))
            .await?;
        return match found {
            Some(c) => Ok(Json(c).into_response()),
            None => Err(ApiError::new(StatusCode::NOT_FOUND, "Conversation not found")),
        };
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let list = state
        .store
        .call(move |conn| conversations::list_conversations(conn, limit))
        .await?;
    Ok(Json(json!({ "conversations": list })).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct CreateConversationBody {
    title: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn create_conversation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let body: CreateConversationBody = if body.is_empty() {
        CreateConversationBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, format!("invalid body: {e}")))?
    };

    let (title, pinned) = match body.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
        Some(title) => (title, true),
        None => (NEW_CONVERSATION_TITLE.to_string(), false),
    };
    let id = state
        .store
        .call(move |conn| conversations::create_conversation(conn, &title, pinned))
        .await?;
    Ok((StatusCode::OK, Json(json!({ "id": id }))).into_response())
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
}

#[tracing::instrument(skip_all)]
async fn rename_conversation(
    State(state): State<AppState>,
    Json(body): Json<RenameBody>,
) -> Result<Response, ApiError> {
    let title = body.title.trim().to_string();
    if body.id.is_empty() || title.is_empty() {
        return Err(ChatError::Validation("id and title are required".into()).into());
    }
    let id = body.id;
    let renamed = state
        .store
        .call(move |conn| conversations::rename_conversation(conn, &id, &title))
        .await?;
    if !renamed {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Conversation not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

#[tracing::instrument(skip(state))]
async fn delete_conversation(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> Result<Response, ApiError> {
    let Some(id) = query.id.filter(|id| !id.is_empty()) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "Conversation ID is required"));
    };
    let deleted = state
        .store
        .call(move |conn| conversations::delete_conversation(conn, &id))
        .await?;
    if !deleted {
        return Err(ApiError::new(StatusCode::NOT_FOUND, "Conversation not found"));
    }
    Ok(Json(json!({ "success": true })).into_response())
}

#[tracing::instrument(skip_all)]
async fn list_models(State(state): State<AppState>) -> Result<Response, ApiError> {
    match state.model.list_models().await {
        Ok(models) => Ok(Json(models).into_response()),
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch models");
            Err(ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch models",
            ))
        }
    }
}

#[tracing::instrument(skip_all)]
async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    let report = state
        .store
        .call(|conn| db::check_database_health(conn))
        .await?;
    let status = if report.integrity_ok { "ok" } else { "degraded" };
    Ok(Json(json!({ "status": status, "database": report })).into_response())
}

//! Similarity retriever: embed a query and rank stored messages against it.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::history::search::{similar_messages, RetrievalParams};
use crate::history::types::ScoredMessage;
use crate::history::Store;

/// Output of [`Retriever::find_similar`].
///
/// The query vector is returned so the caller can store it as the user message's embedding
/// instead of requesting it a second time.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub query_embedding: Vec<f32>,
    pub matches: Vec<ScoredMessage>,
}

#[derive(Clone)]
pub struct Retriever {
    store: Store,
    embedder: Arc<dyn EmbeddingProvider>,
    params: RetrievalParams,
}

impl Retriever {
    pub fn new(store: Store, embedder: Arc<dyn EmbeddingProvider>, params: RetrievalParams) -> Self {
        Self {
            store,
            embedder,
            params,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Embed `query` and return the best matches, boosting those in `conversation_id`.
    ///
    /// An empty match list is a normal outcome. Errors come from the embedding call or the scan.
    #[tracing::instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn find_similar(&self, query: &str, conversation_id: Option<&str>) -> Result<Retrieval> {
        let query_embedding = self.embedder.embed(query).await?;

        let params = self.params.clone();
        let vector = query_embedding.clone();
        let conversation = conversation_id.map(str::to_owned);
        let matches = self
            .store
            .call(move |conn| similar_messages(conn, &vector, conversation.as_deref(), &params))
            .await?;

        tracing::debug!(
            matches = matches.len(),
            top_score = matches.first().map(|m| m.score),
            "retrieval complete"
        );

        Ok(Retrieval {
            query_embedding,
            matches,
        })
    }
}

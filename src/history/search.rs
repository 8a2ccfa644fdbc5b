//! Vector similarity scan over stored message embeddings.
//!
//! Distance math is delegated to sqlite-vec (`vec_distance_cosine`). Similarity is
//! `1 - cosine distance`; candidates from the active conversation are multiplied by the
//! affinity boost before ranking and before the relevance floor is applied.

use anyhow::Result;
use rusqlite::{params, Connection};

use crate::config::RetrievalConfig;
use crate::history::embeddings::embedding_to_bytes;
use crate::history::types::ScoredMessage;

/// Ranking knobs for [`similar_messages`].
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    /// Relevance floor on the final (boosted) score. `None` disables filtering.
    pub min_similarity: Option<f64>,
    pub top_k: usize,
    /// Multiplier applied to candidates from the current conversation.
    pub affinity_boost: f64,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

impl From<&RetrievalConfig> for RetrievalParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            min_similarity: config
                .enforce_min_similarity
                .then_some(config.min_similarity),
            top_k: config.top_k,
            affinity_boost: config.affinity_boost,
        }
    }
}

/// Rank every embedded message against `query_embedding`.
///
/// Messages without an embedding never appear. Embeddings whose dimension differs from the
/// query vector are skipped rather than failing the scan.
pub fn similar_messages(
    conn: &Connection,
    query_embedding: &[f32],
    conversation_id: Option<&str>,
    params: &RetrievalParams,
) -> Result<Vec<ScoredMessage>> {
    if query_embedding.is_empty() || params.top_k == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(
        "SELECT message_id, conversation_id, content, score FROM ( \
             SELECT m.id AS message_id, m.conversation_id AS conversation_id, m.content AS content, \
                    (1.0 - vec_distance_cosine(e.embedding, vec_f32(?1))) \
                      * CASE WHEN m.conversation_id = ?2 THEN ?3 ELSE 1.0 END AS score \
             FROM embeddings e \
             JOIN messages m ON m.id = e.message_id \
             WHERE e.dimensions = ?4 \
         ) \
         WHERE ?5 IS NULL OR score >= ?5 \
         ORDER BY score DESC \
         LIMIT ?6",
    )?;

    let rows = stmt
        .query_map(
            params![
                embedding_to_bytes(query_embedding),
                conversation_id,
                params.affinity_boost,
                query_embedding.len() as i64,
                params.min_similarity,
                params.top_k as i64,
            ],
            |row| {
                Ok(ScoredMessage {
                    message_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    content: row.get(2)?,
                    score: row.get(3)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::history::conversations::create_conversation;
    use crate::history::embeddings::insert_embedding;
    use crate::history::messages::insert_message;
    use crate::history::types::Role;

    fn spike(dim: usize, at: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dim];
        v[at] = 1.0;
        v
    }

    fn store(conn: &mut Connection, conversation_id: &str, content: &str, emb: &[f32]) -> String {
        let message = insert_message(conn, conversation_id, Role::User, content).unwrap();
        insert_embedding(conn, &message.id, emb).unwrap();
        message.id
    }

    fn unfiltered() -> RetrievalParams {
        RetrievalParams {
            min_similarity: None,
            top_k: 5,
            affinity_boost: 1.5,
        }
    }

    #[test]
    fn nearest_message_ranks_first() {
        let mut conn = db::open_memory_database().unwrap();
        let cid = create_conversation(&conn, "t", false).unwrap();
        let near = store(&mut conn, &cid, "near", &spike(8, 0));
        store(&mut conn, &cid, "far", &spike(8, 3));

        let results = similar_messages(&conn, &spike(8, 0), None, &unfiltered()).unwrap();
        assert_eq!(results[0].message_id, near);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!(results[1].score.abs() < 1e-6);
    }

    #[test]
    fn floor_drops_weak_candidates() {
        let mut conn = db::open_memory_database().unwrap();
        let cid = create_conversation(&conn, "t", false).unwrap();
        store(&mut conn, &cid, "near", &spike(8, 0));
        store(&mut conn, &cid, "far", &spike(8, 3));

        let params = RetrievalParams {
            min_similarity: Some(0.75),
            ..unfiltered()
        };
        let results = similar_messages(&conn, &spike(8, 0), None, &params).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "near");
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let mut conn = db::open_memory_database().unwrap();
        let cid = create_conversation(&conn, "t", false).unwrap();
        store(&mut conn, &cid, "old model", &spike(4, 0));
        store(&mut conn, &cid, "new model", &spike(8, 0));

        let results = similar_messages(&conn, &spike(8, 0), None, &unfiltered()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "new model");
    }

    #[test]
    fn top_k_limits_results() {
        let mut conn = db::open_memory_database().unwrap();
        let cid = create_conversation(&conn, "t", false).unwrap();
        for i in 0..4 {
            store(&mut conn, &cid, &format!("m{i}"), &spike(8, i));
        }
        let params = RetrievalParams {
            top_k: 2,
            ..unfiltered()
        };
        let results = similar_messages(&conn, &spike(8, 0), None, &params).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn params_from_config_respect_enforcement_switch() {
        let mut config = RetrievalConfig::default();
        assert_eq!(RetrievalParams::from(&config).min_similarity, Some(0.75));
        config.enforce_min_similarity = false;
        assert_eq!(RetrievalParams::from(&config).min_similarity, None);
    }
}

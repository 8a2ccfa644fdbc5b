mod helpers;

use std::sync::Arc;

use helpers::{test_embedding, test_store, FakeEmbedder, DIMS};
use parley::history::search::{similar_messages, RetrievalParams};
use parley::history::types::Role;
use parley::history::{conversations, embeddings, messages, Store};
use parley::retrieval::Retriever;

fn unfiltered() -> RetrievalParams {
    RetrievalParams {
        min_similarity: None,
        top_k: 5,
        affinity_boost: 1.5,
    }
}

fn vector(x: f32, y: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    v[0] = x;
    v[1] = y;
    v
}

async fn add(store: &Store, conversation_id: &str, content: &str, emb: Option<Vec<f32>>) -> String {
    let cid = conversation_id.to_string();
    let content = content.to_string();
    store
        .call(move |conn| {
            let m = messages::insert_message(conn, &cid, Role::User, &content)?;
            if let Some(v) = emb {
                embeddings::insert_embedding(conn, &m.id, &v)?;
            }
            Ok(m.id)
        })
        .await
        .unwrap()
}

async fn new_conversation(store: &Store) -> String {
    store
        .call(|conn| conversations::create_conversation(conn, "t", true))
        .await
        .unwrap()
}

#[tokio::test]
async fn same_conversation_candidate_is_boosted_by_exactly_one_and_a_half() {
    let store = test_store();
    let current = new_conversation(&store).await;
    let other = new_conversation(&store).await;

    let stored = vector(1.0, 0.0);
    let inside = add(&store, &current, "same text", Some(stored.clone())).await;
    let outside = add(&store, &other, "same text", Some(stored)).await;

    let query = vector(1.0, 1.0);
    let cid = current.clone();
    let results = store
        .call(move |conn| similar_messages(conn, &query, Some(&cid), &unfiltered()))
        .await
        .unwrap();

    let score_of = |id: &str| results.iter().find(|m| m.message_id == id).unwrap().score;
    let boosted = score_of(inside.as_str());
    let raw = score_of(outside.as_str());

    assert!((raw - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    assert!((boosted / raw - 1.5).abs() < 1e-6);
    assert_eq!(results[0].message_id, inside);
}

#[tokio::test]
async fn floor_applies_to_boosted_score() {
    let store = test_store();
    let current = new_conversation(&store).await;
    let other = new_conversation(&store).await;

    // cosine 0.6: below the floor raw, above it once boosted
    let stored = vector(1.0, 0.0);
    add(&store, &current, "mine", Some(stored.clone())).await;
    add(&store, &other, "theirs", Some(stored)).await;

    let params = RetrievalParams {
        min_similarity: Some(0.75),
        ..unfiltered()
    };
    let query = vector(0.6, 0.8);
    let cid = current.clone();
    let results = store
        .call(move |conn| similar_messages(conn, &query, Some(&cid), &params))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "mine");
    assert!((results[0].score - 0.9).abs() < 1e-5);
}

#[tokio::test]
async fn messages_without_embeddings_are_ignored() {
    let store = test_store();
    let cid = new_conversation(&store).await;
    add(&store, &cid, "no vector", None).await;
    let with = add(&store, &cid, "has vector", Some(test_embedding(DIMS, 0))).await;

    let query = test_embedding(DIMS, 0);
    let results = store
        .call(move |conn| similar_messages(conn, &query, None, &unfiltered()))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].message_id, with);
}

#[tokio::test]
async fn empty_store_yields_empty_context() {
    let store = test_store();
    let retriever = Retriever::new(store, Arc::new(FakeEmbedder::new(DIMS)), RetrievalParams::default());

    let retrieval = retriever.find_similar("anything", None).await.unwrap();
    assert!(retrieval.matches.is_empty());
    assert_eq!(retrieval.query_embedding.len(), DIMS);
}

#[tokio::test]
async fn retriever_embeds_query_and_ranks() {
    let store = test_store();
    let cid = new_conversation(&store).await;
    add(&store, &cid, "about cats", Some(test_embedding(DIMS, 3))).await;
    add(&store, &cid, "about dogs", Some(test_embedding(DIMS, 4))).await;

    let embedder = FakeEmbedder::new(DIMS).with("cats?", test_embedding(DIMS, 3));
    let retriever = Retriever::new(store, Arc::new(embedder), RetrievalParams::default());

    let retrieval = retriever.find_similar("cats?", Some(&cid)).await.unwrap();
    assert_eq!(retrieval.matches.len(), 1);
    assert_eq!(retrieval.matches[0].content, "about cats");
    assert!((retrieval.matches[0].score - 1.5).abs() < 1e-6);
}

#[tokio::test]
async fn embedder_failure_surfaces_as_error() {
    let store = test_store();
    let retriever = Retriever::new(store, Arc::new(FakeEmbedder::failing(DIMS)), RetrievalParams::default());
    assert!(retriever.find_similar("q", None).await.is_err());
}

//! Embedding vector storage.
//!
//! Vectors are stored as raw native-endian `f32` blobs, the layout sqlite-vec reads.

use anyhow::{ensure, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::history::now_timestamp;

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Inverse of [`embedding_to_bytes`].
pub fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    ensure!(
        bytes.len() % std::mem::size_of::<f32>() == 0,
        "embedding blob length {} is not a multiple of 4",
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Store the embedding for a message. Fails if the message already has one.
pub fn insert_embedding(conn: &Connection, message_id: &str, embedding: &[f32]) -> Result<String> {
    ensure!(!embedding.is_empty(), "refusing to store an empty embedding");
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO embeddings (id, message_id, embedding, dimensions, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            message_id,
            embedding_to_bytes(embedding),
            embedding.len() as i64,
            now_timestamp()
        ],
    )?;
    Ok(id)
}

/// Drop any existing vector for the message and store a fresh one.
///
/// Only the `backfill --all` path uses this; the chat path writes each vector once.
pub fn replace_embedding(conn: &mut Connection, message_id: &str, embedding: &[f32]) -> Result<String> {
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM embeddings WHERE message_id = ?1", params![message_id])?;
    let id = insert_embedding(&tx, message_id, embedding)?;
    tx.commit()?;
    Ok(id)
}

pub fn get_embedding(conn: &Connection, message_id: &str) -> Result<Option<Vec<f32>>> {
    let blob: Option<Vec<u8>> = conn
        .query_row(
            "SELECT embedding FROM embeddings WHERE message_id = ?1",
            params![message_id],
            |row| row.get(0),
        )
        .optional()?;
    blob.map(|b| bytes_to_embedding(&b)).transpose()
}

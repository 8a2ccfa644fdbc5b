//! Message writes and ordered history reads.
//!
//! Creation time is the canonical order within a conversation. [`insert_message`] clamps
//! each new timestamp to be no earlier than the conversation's latest message, and reads
//! break equal timestamps by rowid, so history never reorders.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::history::now_timestamp;
use crate::history::types::{Message, Role};

/// Append a message to a conversation and bump the conversation's `updated_at`.
pub fn insert_message(
    conn: &mut Connection,
    conversation_id: &str,
    role: Role,
    content: &str,
) -> Result<Message> {
    let tx = conn.transaction()?;

    let latest: Option<String> = tx
        .query_row(
            "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .optional()?
        .flatten();

    let now = now_timestamp();
    let created_at = match latest {
        Some(latest) if latest > now => latest,
        _ => now,
    };

    let id = uuid::Uuid::now_v7().to_string();
    tx.execute(
        "INSERT INTO messages (id, conversation_id, role, content, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, conversation_id, role.as_str(), content, created_at],
    )?;
    tx.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![created_at, conversation_id],
    )?;

    tx.commit()?;

    Ok(Message {
        id,
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        created_at,
    })
}

/// All messages of a conversation in creation order.
pub fn list_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at FROM messages \
         WHERE conversation_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map(params![conversation_id], message_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `(message_id, content)` pairs for non-blank messages that have no embedding yet.
pub fn messages_missing_embeddings(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.content FROM messages m \
         LEFT JOIN embeddings e ON e.message_id = m.id \
         WHERE e.id IS NULL AND trim(m.content, ' ' || char(9, 10, 13)) <> '' \
         ORDER BY m.created_at ASC, m.rowid ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// `(message_id, content)` pairs for every non-blank message.
pub fn all_message_texts(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT id, content FROM messages WHERE trim(content, ' ' || char(9, 10, 13)) <> '' \
         ORDER BY created_at ASC, rowid ASC",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

//! Conversation CRUD.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::history::messages::list_messages;
use crate::history::now_timestamp;
use crate::history::types::{Conversation, ConversationWithMessages};

const CONVERSATION_COLUMNS: &str = "id, title, title_pinned, created_at, updated_at";

/// Insert a new conversation and return its id.
///
/// A `pinned` title is treated as user-supplied and is never replaced by auto-titling.
pub fn create_conversation(conn: &Connection, title: &str, pinned: bool) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO conversations (id, title, title_pinned, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![id, title, pinned, now],
    )?;
    Ok(id)
}

pub fn get_conversation(conn: &Connection, id: &str) -> Result<Option<Conversation>> {
    let conversation = conn
        .query_row(
            &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
            params![id],
            conversation_from_row,
        )
        .optional()?;
    Ok(conversation)
}

/// Fetch a conversation with its messages in creation order.
pub fn get_conversation_with_messages(
    conn: &Connection,
    id: &str,
) -> Result<Option<ConversationWithMessages>> {
    let Some(conversation) = get_conversation(conn, id)? else {
        return Ok(None);
    };
    let messages = list_messages(conn, id)?;
    Ok(Some(ConversationWithMessages {
        conversation,
        messages,
    }))
}

/// Most recently updated conversations first.
pub fn list_conversations(conn: &Connection, limit: usize) -> Result<Vec<Conversation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations \
         ORDER BY updated_at DESC, rowid DESC LIMIT ?1"
    ))?;
    let rows = stmt
        .query_map(params![limit as i64], conversation_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Set a user-chosen title. Pins the title. Returns `false` if the conversation does not exist.
pub fn rename_conversation(conn: &Connection, id: &str, title: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE conversations SET title = ?1, title_pinned = 1, updated_at = ?2 WHERE id = ?3",
        params![title, now_timestamp(), id],
    )?;
    Ok(rows > 0)
}

/// Store an auto-generated title, but only while the title is still unpinned.
///
/// Returns `true` if the title was written. The conditional update makes title generation
/// one-shot even when two turns race on the same conversation.
pub fn set_generated_title(conn: &Connection, id: &str, title: &str) -> Result<bool> {
    let rows = conn.execute(
        "UPDATE conversations SET title = ?1, title_pinned = 1, updated_at = ?2 \
         WHERE id = ?3 AND title_pinned = 0",
        params![title, now_timestamp(), id],
    )?;
    Ok(rows > 0)
}

/// Delete a conversation; messages and embeddings cascade. Returns `false` if nothing was deleted.
pub fn delete_conversation(conn: &Connection, id: &str) -> Result<bool> {
    let rows = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Delete every conversation. Returns the number removed.
pub fn delete_all_conversations(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM conversations", [])?)
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        title_pinned: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

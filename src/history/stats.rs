use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

/// Store-wide counts.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub conversations: u64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub embeddings: u64,
    pub messages_missing_embeddings: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_message: Option<String>,
}

pub fn history_stats(conn: &Connection) -> Result<StatsResponse> {
    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM messages",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(StatsResponse {
        conversations: count("SELECT COUNT(*) FROM conversations")?,
        user_messages: count("SELECT COUNT(*) FROM messages WHERE role = 'user'")?,
        assistant_messages: count("SELECT COUNT(*) FROM messages WHERE role = 'assistant'")?,
        embeddings: count("SELECT COUNT(*) FROM embeddings")?,
        messages_missing_embeddings: count(
            "SELECT COUNT(*) FROM messages m LEFT JOIN embeddings e ON e.message_id = m.id \
             WHERE e.id IS NULL AND trim(m.content, ' ' || char(9, 10, 13)) <> ''",
        )?,
        oldest_message: oldest,
        newest_message: newest,
    })
}

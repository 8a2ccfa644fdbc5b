//! CLI `conversations` command: list, show, rename and delete conversations.

use anyhow::{bail, Result};

use parley::config::ParleyConfig;
use parley::history::conversations;
use parley::history::types::Role;

pub async fn list(config: &ParleyConfig, limit: usize) -> Result<()> {
    let store = super::open_store(config)?;
    let list = store
        .call(move |conn| conversations::list_conversations(conn, limit))
        .await?;
    if list.is_empty() {
        println!("No conversations yet.");
    }
    for c in list {
        println!("{}  {}  {}", c.id, c.updated_at, c.title);
    }
    store.close()?;
    Ok(())
}

pub async fn show(config: &ParleyConfig, id: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let lookup = id.to_string();
    let found = store
        .call(move |conn| conversations::get_conversation_with_messages(conn, &lookup))
        .await?;
    store.close()?;
    let Some(found) = found else {
        bail!("conversation {id} not found");
    };

    println!("{}", found.conversation.title);
    println!("{}", "=".repeat(found.conversation.title.chars().count().max(3)));
    println!("id: {}  created: {}", found.conversation.id, found.conversation.created_at);
    println!();
    for m in &found.messages {
        let who = match m.role {
            Role::User => "you",
            Role::Assistant => "assistant",
        };
        println!("[{}] {who}:", m.created_at);
        println!("{}", m.content);
        println!();
    }
    Ok(())
}

pub async fn rename(config: &ParleyConfig, id: &str, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("title must not be empty");
    }
    let store = super::open_store(config)?;
    let (target, new_title) = (id.to_string(), title.to_string());
    let renamed = store
        .call(move |conn| conversations::rename_conversation(conn, &target, &new_title))
        .await?;
    store.close()?;
    if !renamed {
        bail!("conversation {id} not found");
    }
    println!("Renamed {id} to \"{title}\".");
    Ok(())
}

pub async fn delete(config: &ParleyConfig, id: &str) -> Result<()> {
    let store = super::open_store(config)?;
    let target = id.to_string();
    let deleted = store
        .call(move |conn| conversations::delete_conversation(conn, &target))
        .await?;
    store.close()?;
    if !deleted {
        bail!("conversation {id} not found");
    }
    println!("Deleted {id}.");
    Ok(())
}

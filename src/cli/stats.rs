use anyhow::Result;

use parley::config::ParleyConfig;

/// Print store-wide counts.
pub async fn stats(config: &ParleyConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let store = super::open_store(config)?;

    let response = store
        .call(|conn| parley::history::stats::history_stats(conn))
        .await?;
    store.close()?;
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    println!("Chat History Statistics");
    println!("{}", "=".repeat(40));
    println!("  Conversations:       {}", response.conversations);
    println!("  User messages:       {}", response.user_messages);
    println!("  Assistant messages:  {}", response.assistant_messages);
    println!();
    println!("  Embeddings:          {}", response.embeddings);
    println!("  Missing embeddings:  {}", response.messages_missing_embeddings);
    println!();
    println!("Database size:         {db_size} bytes");

    if let Some(ref oldest) = response.oldest_message {
        println!("Oldest message:        {oldest}");
    }
    if let Some(ref newest) = response.newest_message {
        println!("Newest message:        {newest}");
    }

    Ok(())
}

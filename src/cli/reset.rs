//! CLI `reset` command: delete every conversation after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use parley::config::ParleyConfig;
use parley::history::conversations;

pub async fn reset(config: &ParleyConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This permanently deletes ALL conversations, messages and embeddings.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let store = super::open_store(config)?;
    let removed = store
        .call(|conn| conversations::delete_all_conversations(conn))
        .await?;
    store.close()?;

    println!("Deleted {removed} conversations. Database reset complete.");
    Ok(())
}

//! CLI `backfill` command: embed stored messages that have no vector, or all of them.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use parley::config::ParleyConfig;
use parley::db;
use parley::embedding;
use parley::history::{embeddings, messages};

const BATCH_SIZE: usize = 32;

/// Embed missing messages. With `all`, re-embed every message with the configured model.
pub async fn backfill(config: &ParleyConfig, all: bool) -> Result<()> {
    let store = super::open_store(config)?;
    let provider = embedding::create_provider(&config.embedding, &config.inference)
        .context("failed to create embedding provider")?;

    let pending = store
        .call(move |conn| {
            if all {
                messages::all_message_texts(conn)
            } else {
                messages::messages_missing_embeddings(conn)
            }
        })
        .await?;

    let total = pending.len();
    if total == 0 {
        println!("Every message already has an embedding.");
        return Ok(());
    }

    println!("Embedding {total} messages with model '{}'...", config.embedding.model);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("##-"),
    );

    let mut failed = 0usize;
    for chunk in pending.chunks(BATCH_SIZE) {
        let texts: Vec<&str> = chunk.iter().map(|(_, content)| content.as_str()).collect();
        let vectors = match provider.embed_batch(&texts).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, batch = chunk.len(), "embedding batch failed");
                failed += chunk.len();
                pb.inc(chunk.len() as u64);
                continue;
            }
        };

        let rows: Vec<(String, Vec<f32>)> = chunk
            .iter()
            .zip(vectors)
            .map(|((id, _), v)| (id.clone(), v))
            .collect();
        store
            .call(move |conn| {
                for (id, vector) in &rows {
                    embeddings::replace_embedding(conn, id, vector)?;
                }
                Ok(())
            })
            .await?;

        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();

    let model = config.embedding.model.clone();
    store
        .call(move |conn| Ok(db::migrations::set_embedding_model(conn, &model)?))
        .await?;

    println!(
        "Embedded {} messages with model '{}'.",
        total - failed,
        config.embedding.model
    );
    if failed > 0 {
        println!("{failed} messages failed; run `parley backfill` again to retry them.");
    }
    store.close()?;
    Ok(())
}

use anyhow::Result;

use parley::config::ParleyConfig;
use parley::history::search::RetrievalParams;
use parley::retrieval::Retriever;

/// Run the similarity retriever from the terminal and print scored matches.
pub async fn search(config: &ParleyConfig, query: &str, conversation: Option<&str>) -> Result<()> {
    let store = super::open_store(config)?;
    let embedder = parley::embedding::create_provider(&config.embedding, &config.inference)?;
    let retriever = Retriever::new(store, embedder, RetrievalParams::from(&config.retrieval));

    let retrieval = retriever.find_similar(query, conversation).await?;

    if retrieval.matches.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let floor = retriever
        .params()
        .min_similarity
        .map(|f| format!("{f:.2}"))
        .unwrap_or_else(|| "off".into());
    println!(
        "Found {} result(s) (floor: {floor}, boost: {:.1}x)\n",
        retrieval.matches.len(),
        retriever.params().affinity_boost
    );

    for (i, m) in retrieval.matches.iter().enumerate() {
        let marker = if Some(m.conversation_id.as_str()) == conversation {
            " [this conversation]"
        } else {
            ""
        };
        println!("  {}. {} (score: {:.4}){marker}", i + 1, m.message_id, m.score);
        println!("     {}", super::preview(&m.content, 120));
        println!();
    }

    Ok(())
}

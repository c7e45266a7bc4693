use std::sync::Arc;

use anyhow::Result;
use skill_shadow::config::SkillShadowConfig;
use skill_shadow::embedding::{self, EmbeddingProvider};
use skill_shadow::server::AppState;

/// Run a semantic search from the terminal.
pub async fn search(config: &SkillShadowConfig, query: &str, top_k: Option<usize>) -> Result<()> {
    let provider = embedding::create_provider(&config.embedding)?;
    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::from(provider);
    let state = Arc::new(AppState::open(config, Arc::clone(&embedding_provider))?);

    let top_k = top_k.unwrap_or(config.retrieval.default_top_k);
    let query_text = query.to_string();
    let query_vector =
        tokio::task::spawn_blocking(move || embedding_provider.embed(&query_text)).await??;

    let results = {
        let state = Arc::clone(&state);
        tokio::task::spawn_blocking(move || state.nearest_traces(&query_vector, top_k)).await??
    };

    if results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} trace(s)\n", results.len());
    for (i, trace) in results.iter().enumerate() {
        println!(
            "  {}. {} ({}, {})",
            i + 1,
            trace.error_signature,
            trace.author,
            trace.timestamp
        );
        println!("     {}", preview(&trace.summary, 120));
        if !trace.files_changed.is_empty() {
            println!("     files: {}", trace.files_changed.join(", "));
        }
        println!();
    }

    Ok(())
}

/// First `max_chars` characters, with an ellipsis when cut.
fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

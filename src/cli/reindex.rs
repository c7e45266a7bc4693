//! CLI `reindex` command — rebuild the vector index from the trace store.

use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use skill_shadow::config::SkillShadowConfig;
use skill_shadow::embedding::{self, EmbeddingProvider};
use skill_shadow::index::FlatIndex;
use skill_shadow::trace::TraceStore;

const BATCH_SIZE: usize = 32;

/// Re-embed every stored trace and replace the index, so vector *i* is trace *i* again.
pub async fn reindex(config: &SkillShadowConfig) -> Result<()> {
    let store = TraceStore::new(config.resolved_traces_path());
    let traces = store.read_all().context("failed to read trace store")?;

    let provider: Arc<dyn EmbeddingProvider> = Arc::from(
        embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?,
    );

    let mut index = FlatIndex::new(config.resolved_index_path(), provider.dimensions());
    let total = traces.len();
    println!("Re-embedding {total} traces with model '{}'...", config.embedding.model);

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    for chunk in traces.chunks(BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|t| t.embedding_text()).collect();
        let provider = Arc::clone(&provider);

        let vectors = tokio::task::spawn_blocking(move || {
            let text_refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
            provider.embed_batch(&text_refs)
        })
        .await?
        .context("embedding batch failed")?;

        for vector in &vectors {
            index.add(vector)?;
        }
        pb.inc(chunk.len() as u64);
    }
    pb.finish_and_clear();

    index.persist().context("failed to write vector index")?;
    tracing::info!(vectors = index.len(), path = %index.path().display(), "index rebuilt");

    println!("Index rebuilt: {} vectors for {total} traces.", index.len());
    Ok(())
}

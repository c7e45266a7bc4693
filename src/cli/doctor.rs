//! CLI `doctor` command — check the trace store and vector index and print a report.

use anyhow::Result;
use skill_shadow::config::SkillShadowConfig;
use skill_shadow::embedding::EMBEDDING_DIM;
use skill_shadow::index::FlatIndex;
use skill_shadow::trace::TraceStore;

/// Print a health report for both persisted files.
pub fn doctor(config: &SkillShadowConfig) -> Result<()> {
    let traces_path = config.resolved_traces_path();
    let index_path = config.resolved_index_path();

    println!("Skill-Shadow Health Report");
    println!("==========================");
    println!();

    println!("Trace store:       {}", traces_path.display());
    println!("  File size:       {}", file_size(&traces_path));
    let traces = match TraceStore::new(&traces_path).read_all() {
        Ok(t) => {
            println!("  Records:         {}", t.len());
            Some(t.len())
        }
        Err(e) => {
            println!("  Status:          UNREADABLE ({e})");
            None
        }
    };
    println!();

    println!("Vector index:      {}", index_path.display());
    println!("  File size:       {}", file_size(&index_path));
    let vectors = match FlatIndex::load_or_create(&index_path, EMBEDDING_DIM) {
        Ok(index) => {
            println!("  Vectors:         {}", index.len());
            println!("  Dimension:       {}", index.dimension());
            Some(index.len())
        }
        Err(e) => {
            println!("  Status:          UNREADABLE ({e})");
            None
        }
    };
    println!();

    match (traces, vectors) {
        (Some(t), Some(v)) if t == v => println!("Consistency:       OK ({t} traces, {v} vectors)"),
        (Some(t), Some(v)) => {
            println!("Consistency:       MISMATCH ({t} traces, {v} vectors)");
            println!();
            println!("Semantic search skips vectors past the end of the store and cannot");
            println!("find traces without a vector. Rebuild the index with:");
            println!("  skill-shadow reindex");
        }
        _ => println!("Consistency:       UNKNOWN (see errors above)"),
    }

    Ok(())
}

fn file_size(path: &std::path::Path) -> String {
    match std::fs::metadata(path) {
        Ok(m) => format_bytes(m.len()),
        Err(_) => "(not created yet)".into(),
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

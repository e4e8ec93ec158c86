use crate::cli::EmbedArgs;
use crate::embed::EmbedProgress;
use crate::engine::Engine;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

/// Handle `qmd embed` - generate embeddings for everything that lacks
/// them.
pub fn handle(cmd: &EmbedArgs, engine: &Engine) -> Result<()> {
    let model = cmd
        .model
        .clone()
        .unwrap_or_else(|| engine.config.default_embed_model.clone());

    let bar = if cmd.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} chunks {msg}")
                .expect("static template"),
        );
        bar
    };

    let progress = |p: &EmbedProgress| {
        bar.set_length(p.chunks_total as u64);
        bar.set_position(p.chunks_done as u64);
        bar.set_message(format!("{:.0} KiB/s", p.bytes_per_sec / 1024.0));
    };

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        engine
            .embedder()
            .embed_documents(&model, cmd.force, Some(&progress))
            .await
    })?;
    bar.finish_and_clear();

    println!(
        "Embedded {} chunks across {} documents with {model} ({} skipped empty, {} errors)",
        outcome.chunks_embedded, outcome.docs_embedded, outcome.skipped_empty, outcome.errors
    );
    if outcome.errors > 0 {
        eprintln!("Some chunks failed; re-run `qmd embed` to retry them.");
    }
    Ok(())
}

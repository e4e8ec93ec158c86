use crate::cli::StatusArgs;
use crate::engine::Engine;
use anyhow::Result;

/// Handle `qmd status` - index statistics.
pub fn handle(cmd: &StatusArgs, engine: &Engine) -> Result<()> {
    let stats = engine.store.stats()?;

    println!("Index: {}", engine.config.index_path().display());
    println!("  Collections:       {}", stats.collection_count);
    println!("  Active documents:  {}", stats.document_count);
    println!("  Content bodies:    {}", stats.content_count);
    println!("  Embedded chunks:   {}", stats.chunk_count);
    println!("  Pending embedding: {}", stats.pending_embed_count);
    match stats.vec_dimension {
        Some(dim) => println!("  Vector dimension:  {dim}"),
        None => println!("  Vector dimension:  (no vec table yet)"),
    }
    if !engine.store.vec_available() {
        println!("  Warning: sqlite-vec extension not loaded; vector search disabled");
    }

    if cmd.verbose && !stats.collection_stats.is_empty() {
        println!("\nPer collection:");
        let mut names: Vec<_> = stats.collection_stats.iter().collect();
        names.sort();
        for (name, count) in names {
            println!("  {name}: {count} docs");
        }
    }
    Ok(())
}

use crate::cli::CleanupArgs;
use crate::engine::Engine;
use anyhow::Result;
use rusqlite::OptionalExtension;

/// Handle `qmd cleanup` - remove orphaned content and trim the LLM
/// response cache.
pub fn handle(cmd: &CleanupArgs, engine: &Engine) -> Result<()> {
    if cmd.dry_run {
        let orphans: i64 = engine
            .store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM content
                 WHERE hash NOT IN (SELECT hash FROM documents WHERE active = 1)",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        println!("Would remove {orphans} orphaned content rows");
        return Ok(());
    }

    let orphaned = engine.store.documents().cleanup_orphaned_content()?;
    let trimmed = engine
        .store
        .cache()
        .trim(crate::store::cache::DEFAULT_MAX_ENTRIES)?;
    println!("Removed {orphaned} orphaned content rows, trimmed {trimmed} cache entries");
    Ok(())
}

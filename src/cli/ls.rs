use crate::cli::LsArgs;
use crate::engine::Engine;
use crate::error::QmdError;
use crate::store::path::parse_virtual_path;
use anyhow::Result;

/// Handle `qmd ls` - list collections, or documents under a virtual
/// path, with their short display paths.
pub fn handle(cmd: &LsArgs, engine: &Engine) -> Result<()> {
    let Some(target) = &cmd.path else {
        return list_collections(engine);
    };

    let parsed = parse_virtual_path(target)
        .ok_or_else(|| QmdError::Validation(format!("not a qmd:// path: {target}")))?;
    let collection = engine
        .store
        .collections()
        .get_by_name(&parsed.collection)?
        .ok_or_else(|| QmdError::not_found(format!("collection '{}'", parsed.collection)))?;

    let prefix = parsed.path.trim_end_matches('/');
    let prefix = if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    };
    let docs = engine
        .store
        .documents()
        .list_active(Some(collection.id), prefix)?;
    if docs.is_empty() {
        println!("No documents under {target}");
        return Ok(());
    }

    let displays = engine.store.documents().display_paths()?;
    for addressed in docs {
        let display = displays
            .get(&addressed.doc.id)
            .cloned()
            .unwrap_or_else(|| addressed.doc.path.clone());
        println!(
            "{:<40} {:<30} {}",
            addressed.virtual_path(),
            addressed.doc.title.chars().take(30).collect::<String>(),
            display
        );
    }
    Ok(())
}

fn list_collections(engine: &Engine) -> Result<()> {
    let collections = engine.store.collections().list()?;
    if collections.is_empty() {
        println!("No collections. Add one with `qmd collection add <path>`.");
        return Ok(());
    }
    let stats = engine.store.stats()?;
    for collection in collections {
        let count = stats.collection_stats.get(&collection.name).unwrap_or(&0);
        println!(
            "qmd://{}/ {:>6} docs  {} ({})",
            collection.name, count, collection.pwd, collection.glob_pattern
        );
    }
    Ok(())
}

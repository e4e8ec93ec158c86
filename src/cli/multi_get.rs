use crate::cli::MultiGetArgs;
use crate::engine::Engine;
use crate::error::QmdError;
use crate::store::path::parse_virtual_path;
use anyhow::Result;

/// Handle `qmd multi-get` - print every active document whose path
/// matches a glob, capped per file; oversized files are reported as
/// skipped instead of flooding the output.
pub fn handle(cmd: &MultiGetArgs, engine: &Engine) -> Result<()> {
    let max_bytes = cmd.max_bytes.unwrap_or(engine.config.multi_get_max_bytes);

    let (collection_id, pattern) = match parse_virtual_path(&cmd.pattern) {
        Some(parsed) => {
            let collection = engine
                .store
                .collections()
                .get_by_name(&parsed.collection)?
                .ok_or_else(|| {
                    QmdError::not_found(format!("collection '{}'", parsed.collection))
                })?;
            (Some(collection.id), parsed.path)
        }
        None => (None, cmd.pattern.clone()),
    };

    let glob = glob::Pattern::new(&pattern)
        .map_err(|e| QmdError::Validation(format!("invalid pattern '{pattern}': {e}")))?;

    let docs = engine.store.documents().list_active(collection_id, None)?;
    let mut matched = 0usize;
    let mut skipped = Vec::new();

    for addressed in docs {
        if !glob.matches(&addressed.doc.path) {
            continue;
        }
        matched += 1;
        let body = engine
            .store
            .documents()
            .get_body(&addressed.doc)?
            .unwrap_or_default();
        if body.len() > max_bytes {
            skipped.push((addressed.virtual_path(), body.len()));
            continue;
        }
        println!("==> {} <==", addressed.virtual_path());
        println!("{body}");
        println!();
    }

    if matched == 0 {
        println!("No documents match '{}'", cmd.pattern);
    }
    for (file, size) in &skipped {
        println!("skipped {file} ({size} bytes > {max_bytes})");
    }
    Ok(())
}

use crate::cli::{ContextArgs, ContextCommands};
use crate::engine::Engine;
use crate::error::QmdError;
use crate::store::path::parse_virtual_path;
use anyhow::{bail, Result};

/// Handle `qmd context` subcommands. Targets are virtual paths: the
/// collection root (`qmd://name` or `qmd://name/`) or a path prefix
/// under it.
pub fn handle(cmd: &ContextArgs, engine: &Engine) -> Result<()> {
    match &cmd.command {
        ContextCommands::Add(args) => {
            let (collection_id, prefix) = resolve_target(engine, &args.target)?;
            engine
                .store
                .contexts()
                .set(collection_id, &prefix, &args.context)?;
            println!("Context set for {}", args.target);
        }
        ContextCommands::List(args) => {
            let collection_id = match &args.collection {
                Some(name) => Some(
                    engine
                        .store
                        .collections()
                        .get_by_name(name)?
                        .ok_or_else(|| QmdError::not_found(format!("collection '{name}'")))?
                        .id,
                ),
                None => None,
            };
            let contexts = engine.store.contexts().list(collection_id)?;
            if contexts.is_empty() {
                println!("No contexts configured.");
                return Ok(());
            }
            for row in contexts {
                let collection = engine
                    .store
                    .collections()
                    .get_by_id(row.collection_id)?
                    .map(|c| c.name)
                    .unwrap_or_default();
                let target = if row.path_prefix.is_empty() {
                    format!("qmd://{collection}/")
                } else {
                    format!("qmd://{collection}/{}", row.path_prefix)
                };
                println!("{:<40} {}", target, row.context);
            }
        }
        ContextCommands::Rm(args) => {
            let (collection_id, prefix) = resolve_target(engine, &args.target)?;
            if engine.store.contexts().remove(collection_id, &prefix)? {
                println!("Context removed for {}", args.target);
            } else {
                bail!("no context found for {}", args.target);
            }
        }
    }
    Ok(())
}

fn resolve_target(engine: &Engine, target: &str) -> Result<(i64, String)> {
    let parsed = parse_virtual_path(target)
        .ok_or_else(|| QmdError::Validation(format!("not a qmd:// path: {target}")))?;
    let collection = engine
        .store
        .collections()
        .get_by_name(&parsed.collection)?
        .ok_or_else(|| QmdError::not_found(format!("collection '{}'", parsed.collection)))?;
    Ok((collection.id, parsed.path.trim_end_matches('/').to_string()))
}

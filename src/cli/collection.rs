use crate::cli::{CollectionArgs, CollectionCommands};
use crate::engine::Engine;
use anyhow::{bail, Context, Result};
use dialoguer::Confirm;
use std::path::Path;

/// Handle `qmd collection` subcommands.
pub fn handle(cmd: &CollectionArgs, engine: &Engine) -> Result<()> {
    match &cmd.command {
        CollectionCommands::Add(args) => {
            let pwd = Path::new(&args.path)
                .canonicalize()
                .with_context(|| format!("bad path: {}", args.path))?;
            let pwd_str = pwd.to_string_lossy().into_owned();

            if let Some(name) = &args.name {
                engine
                    .store
                    .collections()
                    .create(name, &pwd_str, &args.mask)?;
            }

            let result = engine.index_files(&pwd, &args.mask, None)?;
            let collection = engine
                .store
                .collections()
                .get_by_pwd_glob(&pwd_str, &args.mask)?
                .expect("collection just indexed");
            println!(
                "Collection '{}': {} documents indexed",
                collection.name, result.indexed
            );
        }
        CollectionCommands::List => {
            let collections = engine.store.collections().list()?;
            if collections.is_empty() {
                println!("No collections. Add one with `qmd collection add <path>`.");
                return Ok(());
            }
            for collection in collections {
                println!(
                    "{:<20} {} ({})",
                    collection.name, collection.pwd, collection.glob_pattern
                );
            }
        }
        CollectionCommands::Remove(args) => {
            if !args.yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Remove collection '{}' and all its documents?",
                        args.name
                    ))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    bail!("aborted");
                }
            }
            let removed = engine.store.collections().remove(&args.name)?;
            let orphaned = engine.store.documents().cleanup_orphaned_content()?;
            println!(
                "Removed collection '{}' ({} orphaned bodies cleaned)",
                removed.name, orphaned
            );
        }
        CollectionCommands::Rename(args) => {
            engine
                .store
                .collections()
                .rename(&args.old_name, &args.new_name)?;
            println!("Renamed '{}' to '{}'", args.old_name, args.new_name);
        }
    }
    Ok(())
}

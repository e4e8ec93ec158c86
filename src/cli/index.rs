use crate::cli::IndexArgs;
use crate::engine::Engine;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Handle `qmd index` - index a directory into its collection.
pub fn handle(cmd: &IndexArgs, engine: &Engine) -> Result<()> {
    let path = Path::new(&cmd.path);

    let bar = if cmd.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                .expect("static template"),
        );
        bar
    };

    let progress = |current: usize, total: usize, rel_path: &str| {
        bar.set_length(total as u64);
        bar.set_position(current as u64);
        bar.set_message(rel_path.to_string());
    };

    let result = engine.index_files(path, &cmd.mask, Some(&progress))?;
    bar.finish_and_clear();

    println!(
        "Indexed {} new, {} updated, {} unchanged, {} removed ({} orphaned bodies cleaned)",
        result.indexed, result.updated, result.unchanged, result.removed, result.orphaned_content
    );
    Ok(())
}

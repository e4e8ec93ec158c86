use crate::cli::search::convert_options;
use crate::cli::SearchArgs;
use crate::engine::Engine;
use crate::formatter::Format;
use anyhow::Result;

/// Handle `qmd vsearch` - vector semantic search.
pub fn handle(cmd: &SearchArgs, engine: &Engine) -> Result<()> {
    let options = convert_options(&cmd.format);
    let model = cmd
        .model
        .clone()
        .unwrap_or_else(|| engine.config.default_embed_model.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let results = rt.block_on(async {
        engine
            .search()
            .search_vector(&cmd.query, &model, &options)
            .await
    })?;

    if results.is_empty() && !engine.store.vectors().table_exists()? {
        eprintln!("No embeddings yet; run `qmd embed` first.");
    }

    let formatter = Format::from_string(&cmd.format.format);
    formatter.print_search_results(&cmd.query, &results)?;
    Ok(())
}

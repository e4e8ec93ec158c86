use crate::cli::search::convert_options;
use crate::cli::SearchArgs;
use crate::engine::Engine;
use crate::formatter::Format;
use anyhow::Result;

/// Handle `qmd query` - hybrid search with expansion and reranking.
pub fn handle(cmd: &SearchArgs, engine: &Engine) -> Result<()> {
    let options = convert_options(&cmd.format);

    let rt = tokio::runtime::Runtime::new()?;
    let results =
        rt.block_on(async { engine.search().search_hybrid(&cmd.query, &options).await })?;

    let formatter = Format::from_string(&cmd.format.format);
    formatter.print_search_results(&cmd.query, &results)?;
    Ok(())
}

use crate::cli::{FormatOptions, SearchArgs};
use crate::engine::Engine;
use crate::formatter::Format;
use crate::search::SearchOptions;
use anyhow::Result;

/// Handle `qmd search` - BM25 full-text search.
pub fn handle(cmd: &SearchArgs, engine: &Engine) -> Result<()> {
    let options = convert_options(&cmd.format);
    let results = engine.search().search_fts(&cmd.query, &options)?;

    let formatter = Format::from_string(&cmd.format.format);
    formatter.print_search_results(&cmd.query, &results)?;
    Ok(())
}

pub(crate) fn convert_options(format: &FormatOptions) -> SearchOptions {
    SearchOptions {
        limit: format.limit,
        min_score: format.min_score,
        collection: format.collection.clone(),
    }
}

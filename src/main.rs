use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use qmd::cli::{self, Cli, Commands};
use qmd::config::Config;
use qmd::engine::Engine;
use qmd::error::QmdError;
use qmd::mcp;

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        // Document misses carry path suggestions worth surfacing
        if let Some(QmdError::NotFound { what, similar }) = err.downcast_ref::<QmdError>() {
            eprintln!("Error: not found: {what}");
            if !similar.is_empty() {
                eprintln!("Similar paths:");
                for path in similar {
                    eprintln!("  {path}");
                }
            }
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let cli = Cli::parse();

    let engine = Engine::new(config).context("failed to open index")?;
    info!("index: {}", engine.config.index_path().display());

    match &cli.command {
        Commands::Collection(cmd) => cli::collection::handle(cmd, &engine)?,
        Commands::Context(cmd) => cli::context::handle(cmd, &engine)?,
        Commands::Index(cmd) => cli::index::handle(cmd, &engine)?,
        Commands::Embed(cmd) => cli::embed::handle(cmd, &engine)?,
        Commands::Search(cmd) => cli::search::handle(cmd, &engine)?,
        Commands::Vsearch(cmd) => cli::vsearch::handle(cmd, &engine)?,
        Commands::Query(cmd) => cli::query::handle(cmd, &engine)?,
        Commands::Get(cmd) => cli::get::handle(cmd, &engine)?,
        Commands::MultiGet(cmd) => cli::multi_get::handle(cmd, &engine)?,
        Commands::Ls(cmd) => cli::ls::handle(cmd, &engine)?,
        Commands::Status(cmd) => cli::status::handle(cmd, &engine)?,
        Commands::Cleanup(cmd) => cli::cleanup::handle(cmd, &engine)?,
        Commands::Mcp(_) => return mcp::run_server(engine),
    }

    engine.close()?;
    Ok(())
}

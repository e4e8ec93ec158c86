use clap::{Args, Parser, Subcommand};

// CLI submodule declarations
pub mod cleanup;
pub mod collection;
pub mod context;
pub mod embed;
pub mod get;
pub mod index;
pub mod ls;
pub mod multi_get;
pub mod query;
pub mod search;
pub mod status;
pub mod vsearch;

/// qmd - on-device markdown search
#[derive(Parser, Debug)]
#[command(name = "qmd")]
#[command(version = "0.1.0")]
#[command(about = "On-device markdown search with hybrid BM25 and vector retrieval", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collection management
    Collection(CollectionArgs),

    /// Path context management
    Context(ContextArgs),

    /// Index a directory of markdown files
    Index(IndexArgs),

    /// Generate embeddings for indexed documents
    Embed(EmbedArgs),

    /// BM25 full-text search
    Search(SearchArgs),

    /// Vector semantic search
    Vsearch(SearchArgs),

    /// Hybrid search with expansion and reranking
    Query(SearchArgs),

    /// Get document content
    Get(GetArgs),

    /// Get several documents by path pattern
    MultiGet(MultiGetArgs),

    /// List collections or documents
    Ls(LsArgs),

    /// Show index status
    Status(StatusArgs),

    /// Remove orphaned content and trim caches
    Cleanup(CleanupArgs),

    /// Run the MCP tool server on stdio
    Mcp(McpArgs),
}

/// Options shared by the search-shaped commands.
#[derive(Debug, Clone, Args)]
pub struct FormatOptions {
    /// Output format: cli, json, md, csv, files
    #[arg(long, default_value = "cli")]
    pub format: String,
    /// Number of results to return
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
    /// Minimum score threshold
    #[arg(long, default_value = "0.0")]
    pub min_score: f64,
    /// Collection to search (default: all)
    #[arg(short, long)]
    pub collection: Option<String>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search query
    pub query: String,
    /// Model override (embedding model for vsearch)
    #[arg(short, long)]
    pub model: Option<String>,
    #[command(flatten)]
    pub format: FormatOptions,
}

#[derive(Args, Debug)]
pub struct CollectionArgs {
    #[command(subcommand)]
    pub command: CollectionCommands,
}

#[derive(Subcommand, Debug)]
pub enum CollectionCommands {
    /// Register and index a directory
    Add(CollectionAddArgs),
    /// List collections
    List,
    /// Remove a collection and its documents
    Remove(CollectionRemoveArgs),
    /// Rename a collection
    Rename(CollectionRenameArgs),
}

#[derive(Args, Debug)]
pub struct CollectionAddArgs {
    /// Directory to index
    pub path: String,
    /// Collection name (default: directory basename)
    #[arg(short, long)]
    pub name: Option<String>,
    /// File pattern
    #[arg(long, default_value = "**/*.md")]
    pub mask: String,
}

#[derive(Args, Debug)]
pub struct CollectionRemoveArgs {
    pub name: String,
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args, Debug)]
pub struct CollectionRenameArgs {
    pub old_name: String,
    pub new_name: String,
}

#[derive(Args, Debug)]
pub struct ContextArgs {
    #[command(subcommand)]
    pub command: ContextCommands,
}

#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Attach a context to qmd://collection/prefix
    Add(ContextAddArgs),
    /// List contexts
    List(ContextListArgs),
    /// Remove a context
    Rm(ContextRemoveArgs),
}

#[derive(Args, Debug)]
pub struct ContextAddArgs {
    /// Target: qmd://collection or qmd://collection/path/prefix
    pub target: String,
    /// Context text shown with matching results
    pub context: String,
}

#[derive(Args, Debug)]
pub struct ContextListArgs {
    /// Restrict to one collection
    #[arg(short, long)]
    pub collection: Option<String>,
}

#[derive(Args, Debug)]
pub struct ContextRemoveArgs {
    /// Target: qmd://collection or qmd://collection/path/prefix
    pub target: String,
}

#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory to index (default: current directory)
    #[arg(default_value = ".")]
    pub path: String,
    /// File pattern
    #[arg(long, default_value = "**/*.md")]
    pub mask: String,
    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Embedding model (default from config)
    #[arg(short, long)]
    pub model: Option<String>,
    /// Drop all vectors and re-embed from scratch
    #[arg(short, long)]
    pub force: bool,
    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// qmd://collection/path or a filesystem path, with optional :line
    pub file: String,
    /// Start line (1-based)
    #[arg(long, default_value = "1")]
    pub from: usize,
    /// Number of lines
    #[arg(short = 'n', long, default_value = "50")]
    pub limit: usize,
    /// Print the whole document
    #[arg(long)]
    pub full: bool,
}

#[derive(Args, Debug)]
pub struct MultiGetArgs {
    /// Path pattern: qmd://collection/glob or a bare glob over all collections
    pub pattern: String,
    /// Per-file byte cap (default from config); larger files are skipped
    #[arg(long)]
    pub max_bytes: Option<usize>,
}

#[derive(Args, Debug)]
pub struct LsArgs {
    /// Optional qmd://collection[/prefix] to list documents under
    pub path: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Show per-collection detail
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct CleanupArgs {
    /// Report without deleting
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args, Debug)]
pub struct McpArgs {}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from(["qmd", "search", "hello world", "-n", "5"]);
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.query, "hello world");
                assert_eq!(args.format.limit, 5);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_collection_add() {
        let cli = Cli::parse_from(["qmd", "collection", "add", "/tmp/docs", "--mask", "*.md"]);
        match cli.command {
            Commands::Collection(CollectionArgs {
                command: CollectionCommands::Add(args),
            }) => {
                assert_eq!(args.path, "/tmp/docs");
                assert_eq!(args.mask, "*.md");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

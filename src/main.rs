use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use soprag::config::Config;
use soprag::embedder::{self, Embedder};
use soprag::extractor::{DocumentExtractor, TextExtractor};
use soprag::indexer::{self, Indexer, MetadataStore};
use soprag::mcp::{McpContext, McpServer};
use soprag::prompt;
use soprag::retriever::Retriever;
use soprag::store::{SqliteStore, VectorStore};

/// Incremental SOP indexer and retrieval server.
#[derive(Parser)]
#[command(name = "soprag", version, about)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true, default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP tools on stdio (default)
    Serve,
    /// Sync the SOP directory into the vector store
    Sync,
    /// Show when the last sync ran and whether files changed since
    Status,
    /// Search indexed SOPs
    Search {
        query: String,
        /// Maximum number of chunks to return
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Print the grounded prompt for a question
    Prompt {
        query: String,
        /// File whose text is included as uploaded context
        #[arg(long)]
        uploaded: Option<std::path::PathBuf>,
    },
    /// Download the embedding model files
    DownloadModel,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the MCP protocol; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config),
        Command::Sync => sync(&config),
        Command::Status => status(&config),
        Command::Search { query, top_k } => search(&config, &query, top_k),
        Command::Prompt { query, uploaded } => print_prompt(&config, &query, uploaded.as_deref()),
        Command::DownloadModel => {
            embedder::download::download_model_files(&config.model.repo, &config.model_dir())
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.db_path, &config.collection, config.model.dimensions)
        .with_context(|| format!("failed to open vector store: {}", config.db_path))
}

fn serve(config: Config) -> Result<()> {
    info!("Starting SopRAG MCP server...");

    // Model download uses blocking HTTP, so it happens before the runtime starts
    let embedder: Arc<dyn Embedder> = Arc::from(embedder::from_config(&config)?);
    let store = open_store(&config)?;
    let ctx = McpContext::new(store, config, embedder, Arc::new(DocumentExtractor));

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(McpServer::new(ctx).start())
}

fn sync(config: &Config) -> Result<()> {
    let embedder = embedder::from_config(config)?;
    let mut store = open_store(config)?;
    let extractor = DocumentExtractor;

    let pb = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::default_bar().template("  {bar:40.cyan/blue} {pos}% {msg}") {
        pb.set_style(style.progress_chars("█▓░"));
    }
    let mut on_progress = |fraction: f32, message: &str| {
        pb.set_position((fraction * 100.0).round() as u64);
        pb.set_message(message.to_string());
    };

    let mut indexer = Indexer::new(
        config.source_dir(),
        MetadataStore::new(config.metadata_path()),
        &mut store,
        embedder.as_ref(),
        &extractor,
    )
    .with_chunker(config.chunker()?)
    .with_lock_stale_after(config.lock_stale_after());

    let progress: &mut dyn FnMut(f32, &str) = &mut on_progress;
    let report = indexer.reindex(Some(progress))?;
    pb.finish_and_clear();

    println!(
        "New: {}  Modified: {}  Deleted: {}  Processed: {}",
        report.new_count, report.modified_count, report.deleted_count, report.total_processed
    );
    println!(
        "Chunks added: {}  removed: {}  total in store: {}",
        report.chunks_added,
        report.chunks_removed,
        store.count()?
    );
    for err in &report.errors {
        eprintln!("  ! {err}");
    }
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let metadata = MetadataStore::new(config.metadata_path())
        .load()
        .context("failed to read sync metadata")?;
    let status = indexer::fetch_status(&config.source_dir(), &metadata, chrono::Utc::now());
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn search(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let embedder = embedder::from_config(config)?;
    let store = open_store(config)?;
    let retriever = Retriever::new(&store, embedder.as_ref());

    let results = retriever.try_search(query, top_k.unwrap_or(config.search_top_k))?;
    if results.is_empty() {
        println!("No matching SOP chunks.");
    }
    for (rank, hit) in results.iter().enumerate() {
        println!(
            "{}. {} [chunk {}/{}] similarity {:.3}",
            rank + 1,
            hit.metadata.source,
            hit.metadata.chunk_index + 1,
            hit.metadata.total_chunks,
            hit.similarity
        );
        println!("   {}", hit.text.chars().take(200).collect::<String>());
    }
    Ok(())
}

fn print_prompt(config: &Config, query: &str, uploaded: Option<&std::path::Path>) -> Result<()> {
    let uploaded_text = match uploaded {
        Some(path) => Some(DocumentExtractor.extract(path)?),
        None => None,
    };

    let embedder = embedder::from_config(config)?;
    let store = open_store(config)?;
    let chunks = Retriever::new(&store, embedder.as_ref()).search(query, config.search_top_k);

    println!(
        "{}",
        prompt::build_prompt(query, &chunks, uploaded_text.as_deref())
    );
    Ok(())
}

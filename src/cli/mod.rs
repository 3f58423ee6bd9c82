//! CLI command definitions and implementations.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::app::App;
use crate::config::AppConfig;
use crate::embedding::has_api_key;
use crate::knowledge::store::Category;
use crate::retrieve::Retriever;
use crate::scrape::save_snapshot;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "hotel-rag")]
#[command(version, about = "Incremental hotel RAG pipeline", long_about = None)]
pub struct Cli {
    /// Config file (JSON). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape hotels and index what changed
    Ingest {
        /// Read records from a snapshot file instead of the live API
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Scrape live and write the records to a snapshot file first
        #[arg(long)]
        save_snapshot: Option<PathBuf>,
    },

    /// Ask a question over the indexed hotels
    Query {
        /// The question
        query: String,

        /// Hits per category
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print retrieved documents without calling the answer model
        #[arg(long)]
        retrieve_only: bool,
    },

    /// Drop indexed chunks and fingerprints
    Clear {
        /// Category to clear: info, review, or all
        #[arg(short = 'C', long, default_value = "all")]
        category: String,
    },

    /// Show system status
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Ingest {
            snapshot,
            save_snapshot,
        } => cmd_ingest(config, snapshot, save_snapshot).await,
        Commands::Query {
            query,
            limit,
            retrieve_only,
        } => cmd_query(config, &query, limit, retrieve_only).await,
        Commands::Clear { category } => cmd_clear(config, &category).await,
        Commands::Status => cmd_status(config).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            AppConfig::load(&path).with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(AppConfig::default()),
    }
}

fn require_embedding_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API key is not set.\n\n\
             Setup:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             or\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             Get a key: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Ingestion command.
///
/// Pulls records live or from a snapshot, then indexes only what changed.
async fn cmd_ingest(
    config: AppConfig,
    snapshot: Option<PathBuf>,
    snapshot_out: Option<PathBuf>,
) -> Result<()> {
    require_embedding_key()?;

    let app = App::build(config).await.context("assembling app")?;

    let source = if let Some(ref out) = snapshot_out {
        // Scrape once, persist the records, then ingest from the file.
        let scraper = app.record_source_live().context("building scraper")?;
        println!("[*] Scraping {} ...", app.config().scraper.base_url);
        let records = scraper.records().await.context("scraping records")?;
        save_snapshot(out, &records)
            .await
            .context("writing snapshot")?;
        println!("[OK] Snapshot written: {} ({} records)", out.display(), records.len());
        app.record_source(Some(out))?
    } else {
        app.record_source(snapshot.as_deref())?
    };

    println!("[*] Ingesting from {} ...", source.name());
    let report = app.pipeline(source).ingest().await.context("ingestion run")?;

    println!();
    println!("[OK] Ingestion finished");
    println!("     Records seen:   {}", report.records_seen);
    println!("     Unchanged:      {}", report.unchanged);
    for category in Category::ALL {
        let added = report.chunks_added.get(&category).copied().unwrap_or(0);
        println!("     New {} chunks: {}", category, added);
    }

    if !report.errors.is_empty() {
        println!();
        println!("[!] {} record(s) skipped:", report.errors.len());
        for error in &report.errors {
            println!("    {}", error);
        }
    }

    Ok(())
}

/// Query command.
///
/// Retrieves joined info+review documents, optionally feeding them to the
/// answer model.
async fn cmd_query(
    mut config: AppConfig,
    query: &str,
    limit: Option<usize>,
    retrieve_only: bool,
) -> Result<()> {
    require_embedding_key()?;

    if let Some(limit) = limit {
        config.retrieval.top_k = limit;
    }

    let app = App::build(config).await.context("assembling app")?;

    println!("[*] Searching: \"{}\"", query);

    if retrieve_only {
        let retriever = app.combined_retriever()?;
        let docs = retriever.retrieve(query).await.context("retrieval")?;

        if docs.is_empty() {
            println!("\n[!] No results.");
            return Ok(());
        }

        println!("\n[OK] Retrieved {} document(s):\n", docs.len());
        for (i, doc) in docs.iter().enumerate() {
            let hotel = doc.source_id().unwrap_or("-");
            println!("{}. [hotel {}]", i + 1, hotel);
            println!("   {}", truncate_text(&doc.content, 300));
            println!();
        }
        return Ok(());
    }

    if std::env::var("DEEPSEEK_API_KEY").is_err() {
        bail!(
            "DeepSeek API key is not set.\n\
             Setup: export DEEPSEEK_API_KEY=your-api-key"
        );
    }

    let processor = app.query_processor()?;
    let answer = processor.process(query).await.context("answer generation")?;

    println!();
    println!("{}", answer);

    Ok(())
}

/// Clear command.
///
/// Drops chunks and fingerprints for one category or all of them.
async fn cmd_clear(config: AppConfig, category: &str) -> Result<()> {
    require_embedding_key()?;

    let targets: Vec<Category> = if category == "all" {
        Category::ALL.to_vec()
    } else {
        vec![Category::parse(category).context("parsing category")?]
    };

    let app = App::build(config).await.context("assembling app")?;

    for category in targets {
        app.store()
            .clear(category)
            .await
            .with_context(|| format!("clearing {} chunks", category))?;
        let fingerprints = app
            .fingerprints()
            .clear(category)
            .with_context(|| format!("clearing {} fingerprints", category))?;
        println!("[OK] {}: chunks dropped, {} fingerprint(s) removed", category, fingerprints);
    }

    Ok(())
}

/// Status command.
async fn cmd_status(config: AppConfig) -> Result<()> {
    println!("hotel-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = config.data_dir();
    println!("[*] Data directory: {}", data_dir.display());
    println!("[*] Store backend:  {}", config.store.backend);

    if has_api_key() {
        println!("[OK] Embedding API key: set");
    } else {
        println!("[!] Embedding API key: missing");
        println!("    Setup: export GEMINI_API_KEY=your-key");
    }

    if std::env::var("DEEPSEEK_API_KEY").is_ok() {
        println!("[OK] DeepSeek API key: set");
    } else {
        println!("[!] DeepSeek API key: missing (retrieval still works)");
    }

    // Fingerprint counts need no embedder.
    match crate::knowledge::FingerprintStore::open_in(&data_dir) {
        Ok(fingerprints) => {
            for category in Category::ALL {
                match fingerprints.count(category) {
                    Ok(count) => println!("[OK] {} fingerprints: {}", category, count),
                    Err(e) => println!("[!] {} fingerprint count failed: {}", category, e),
                }
            }
        }
        Err(e) => println!("[!] Fingerprint store unavailable: {}", e),
    }

    // Chunk counts need the store, which needs the embedder.
    if has_api_key() {
        match App::build(config).await {
            Ok(app) => {
                for category in Category::ALL {
                    match app.store().count(category).await {
                        Ok(count) => println!("[OK] {} chunks: {}", category, count),
                        Err(e) => {
                            tracing::debug!(category = %category, "chunk count failed: {}", e);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::debug!("app assembly failed: {}", e);
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 safe single-line truncation.
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let persian = "هتل پنج ستاره تهران";
        let truncated = truncate_text(persian, 3);
        assert_eq!(truncated, "هتل...");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["hotel-rag", "query", "best hotel", "--limit", "3"]).unwrap();
        match cli.command {
            Commands::Query { query, limit, retrieve_only } => {
                assert_eq!(query, "best hotel");
                assert_eq!(limit, Some(3));
                assert!(!retrieve_only);
            }
            _ => panic!("expected query subcommand"),
        }

        let cli = Cli::try_parse_from(["hotel-rag", "ingest", "--snapshot", "records.json"]).unwrap();
        assert!(matches!(cli.command, Commands::Ingest { .. }));
    }
}

//! # Repo Scout CLI (`scout`)
//!
//! ## Usage
//!
//! ```bash
//! scout --config ./config/scout.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scout init` | Create the index database and repository directory |
//! | `scout index <repo>` | Build a repository index (`--force` to rebuild) |
//! | `scout query <repo> "<question>"` | Ask a question, print ranked snippets |
//! | `scout overview <repo>` | Summarize stack, file statistics and README |
//! | `scout status <repo>` | Show index and cache state for a repository |
//! | `scout clear <repo>` | Delete a repository's index and cached clone |
//! | `scout list` | List stored indexes |
//! | `scout serve http` | Start the HTTP API |
//! | `scout serve mcp` | Serve MCP over stdio |
//!
//! ## Examples
//!
//! ```bash
//! scout query https://github.com/tokio-rs/axum "how are routes matched?" --top-k 5
//! scout query . "where is the config parsed?" --json
//! scout index git@github.com:owner/repo.git --force
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use repo_scout::config::{self, Config};
use repo_scout::query::{resolve_reference, QueryOutcome, QueryRequest, QueryResponse};
use repo_scout::{db, mcp, migrate, open_engine, server};

/// Repo Scout: ask natural-language questions about any code repository.
///
/// Every command accepts `--config`. When the file does not exist the
/// built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "scout",
    about = "Index a code repository on demand and answer questions with ranked snippets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/scout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and the repository storage directory.
    ///
    /// Idempotent.
    Init,

    /// Build the index for a repository.
    ///
    /// Skips the build when a fresh index exists, unless `--force` is given.
    Index {
        /// Repository URL or local path.
        repo: String,

        /// Rebuild even if the stored index is fresh.
        #[arg(long)]
        force: bool,
    },

    /// Ask a question about a repository.
    Query {
        /// Repository URL or local path.
        repo: String,

        /// The question, in natural language.
        question: String,

        /// Number of snippets to return (1-50).
        #[arg(long)]
        top_k: Option<usize>,

        /// Print the JSON response instead of formatted snippets.
        #[arg(long)]
        json: bool,
    },

    /// Summarize a repository's stack, files and README without indexing it.
    Overview {
        /// Repository URL or local path.
        repo: String,

        /// Print JSON instead of markdown.
        #[arg(long)]
        json: bool,
    },

    /// Show index and cache state for a repository.
    Status {
        /// Repository URL or local path.
        repo: String,
    },

    /// Delete a repository's index and cached clone.
    Clear {
        /// Repository URL or local path.
        repo: String,
    },

    /// List stored indexes.
    List,

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// HTTP API on `[server].bind`.
    Http,
    /// MCP protocol over stdin/stdout.
    Mcp,
}

fn init_subscriber() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_or_default(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!("no config at {}, using defaults", path.display());
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let cfg = load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            std::fs::create_dir_all(&cfg.storage.repo_dir).with_context(|| {
                format!(
                    "Failed to create repository directory: {}",
                    cfg.storage.repo_dir.display()
                )
            })?;
            println!("Database initialized at {}.", cfg.storage.db_path.display());
        }
        Commands::Index { repo, force } => {
            let engine = open_engine(&cfg).await?;
            let reference = resolve_reference(&repo)?;
            let coordinator = engine.coordinator();
            let meta = if force {
                coordinator.rebuild(&reference).await?
            } else {
                coordinator.ensure_index(&reference).await?
            };
            println!(
                "Indexed {}: {} files, {} chunks ({} skipped), model {}",
                meta.location, meta.total_files, meta.total_chunks, meta.skipped_files, meta.model
            );
        }
        Commands::Query {
            repo,
            question,
            top_k,
            json,
        } => {
            let engine = open_engine(&cfg).await?;
            let request = QueryRequest {
                repository_reference: repo,
                question,
                top_k,
            };
            let result = engine.answer(&request).await;
            let failed = result.is_err();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&QueryOutcome::from(result))?
                );
            } else {
                print_response(result?);
            }
            if failed {
                std::process::exit(1);
            }
        }
        Commands::Overview { repo, json } => {
            let engine = open_engine(&cfg).await?;
            let overview = engine.overview(&repo).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                println!("{}", overview.to_markdown());
            }
        }
        Commands::Status { repo } => {
            let engine = open_engine(&cfg).await?;
            let reference = resolve_reference(&repo)?;
            let status = engine.coordinator().status(&reference).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Clear { repo } => {
            let engine = open_engine(&cfg).await?;
            let reference = resolve_reference(&repo)?;
            if engine.coordinator().clear(&reference).await? {
                println!("Cleared index for {}.", reference.canonical());
            } else {
                println!("No index stored for {}.", reference.canonical());
            }
        }
        Commands::List => {
            let engine = open_engine(&cfg).await?;
            let indexes = engine.coordinator().list().await?;
            if indexes.is_empty() {
                println!("No indexes.");
            }
            for meta in indexes {
                println!(
                    "{:<40} {:>6} files {:>7} chunks  {}  {}",
                    meta.repo_id,
                    meta.total_files,
                    meta.total_chunks,
                    meta.built_at.format("%Y-%m-%d %H:%M"),
                    meta.location
                );
            }
        }
        Commands::Serve { service } => {
            let engine = open_engine(&cfg).await?;
            match service {
                ServeService::Http => server::run_server(&cfg, engine).await?,
                ServeService::Mcp => mcp::run_stdio(engine).await?,
            }
        }
    }

    Ok(())
}

fn print_response(response: QueryResponse) {
    let repo = &response.repository;
    println!(
        "{} ({} files, {} chunks)",
        repo.url, repo.total_files_indexed, repo.total_chunks
    );
    if response.code_snippets.is_empty() {
        println!("No results.");
        return;
    }
    for (i, snippet) in response.code_snippets.iter().enumerate() {
        println!(
            "\n{}. [{:.3}] {}:{}-{} ({})",
            i + 1,
            snippet.relevance_score,
            snippet.file_path,
            snippet.start_line,
            snippet.end_line,
            snippet.language
        );
        for line in snippet.content.lines() {
            println!("    {line}");
        }
    }
}

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{self, EnvFilter};

use repolens_mcp::repolens::RepositoryManager;
use repolens_mcp::services;

#[derive(Parser)]
#[command(author, version = "0.1.0", about = "RepoLens CLI for inspecting GitHub repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// GitHub API token (overrides REPOLENS_MCP_GITHUB_TOKEN and GITHUB_TOKEN)
    #[arg(short = 't', long, global = true)]
    github_token: Option<String>,

    /// Cache root for mirrors, indexes and the metadata store
    #[arg(short = 'c', long = "cache-dir", global = true)]
    cache_dir: Option<PathBuf>,

    /// Mirror time-to-live in seconds
    #[arg(long, global = true)]
    ttl_seconds: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full-text search over documentation, issues and pull requests
    Search {
        /// Repository, e.g. 'tokio-rs/tokio' or 'https://github.com/tokio-rs/tokio'
        repository: String,

        /// Search query
        query: String,

        /// Maximum number of hits
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Show the directory tree of a repository
    Structure {
        repository: String,

        /// Directory to start from, relative to the repository root
        #[arg(short, long)]
        path: Option<String>,

        /// Levels to descend (default 4, max 10)
        #[arg(long)]
        depth: Option<i64>,
    },
    /// Print one text file of a repository
    Read {
        repository: String,

        /// File path relative to the repository root
        path: String,

        /// Print only the file content instead of the JSON result
        #[arg(long)]
        raw: bool,
    },
    /// Summarize a repository
    Summary { repository: String },
    /// Clear the cache of one repository, or of all with --all
    ClearCache {
        #[arg(required_unless_present = "all")]
        repository: Option<String>,

        #[arg(long, conflicts_with = "repository")]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    tracing::debug!("RepoLens CLI initialized");
    if let Some(dir) = &cli.cache_dir {
        tracing::info!("Using custom cache directory: {}", dir.display());
    }

    let manager = services::build_manager(cli.github_token, cli.cache_dir, cli.ttl_seconds)?;
    run(&manager, cli.command).await
}

async fn run(manager: &RepositoryManager, command: Commands) -> Result<()> {
    match command {
        Commands::Search {
            repository,
            query,
            limit,
        } => print_result(services::search(manager, &repository, &query, limit).await),
        Commands::Structure {
            repository,
            path,
            depth,
        } => print_result(services::structure(manager, &repository, path.as_deref(), depth).await),
        Commands::Read {
            repository,
            path,
            raw,
        } => {
            let result = services::read(manager, &repository, &path).await;
            match result {
                Ok(output) if raw => {
                    if let Some(warning) = &output.warning {
                        tracing::warn!("{}", warning);
                    }
                    print!("{}", output.content);
                    Ok(())
                }
                other => print_result(other),
            }
        }
        Commands::Summary { repository } => {
            print_result(services::summary(manager, &repository).await)
        }
        Commands::ClearCache { repository, all } => {
            let target = if all { None } else { repository.as_deref() };
            print_result(services::clear_cache(manager, target).await)
        }
    }
}

fn print_result<T: Serialize>(result: repolens_mcp::repolens::Result<T>) -> Result<()> {
    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string_pretty(&err.to_response())?);
            tracing::error!("{}", err);
            std::process::exit(1);
        }
    }
}

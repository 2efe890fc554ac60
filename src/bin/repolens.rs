use anyhow::Result;
use clap::{Parser, Subcommand};
use repolens_mcp::repolens::config::github_token_from_env;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version = "0.1.0", about, long_about = None)]
#[command(propagate_version = true)]
#[command(disable_version_flag = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the server in stdin/stdout mode
    Stdio {
        /// Enable debug logging
        #[arg(short, long)]
        debug: bool,

        /// GitHub API token (overrides REPOLENS_MCP_GITHUB_TOKEN and GITHUB_TOKEN)
        #[arg(short = 't', long)]
        github_token: Option<String>,

        /// Cache root for mirrors, indexes and the metadata store
        /// (overrides REPOLENS_MCP_CACHE_DIR)
        #[arg(short = 'c', long = "cache-dir")]
        cache_dir: Option<std::path::PathBuf>,

        /// Mirror time-to-live in seconds (overrides REPOLENS_MCP_CACHE_TTL_SECONDS)
        #[arg(long)]
        ttl_seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Stdio {
            debug,
            github_token,
            cache_dir,
            ttl_seconds,
        } => run_stdio_server(debug, github_token, cache_dir, ttl_seconds).await,
    }
}

async fn run_stdio_server(
    debug: bool,
    github_token: Option<String>,
    cache_dir: Option<std::path::PathBuf>,
    ttl_seconds: Option<u64>,
) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .init();

    tracing::info!("Starting RepoLens MCP server in STDIN/STDOUT mode");
    if github_token.is_some() {
        tracing::info!("Using GitHub token from command line arguments");
    }
    if let Some(dir) = &cache_dir {
        tracing::info!("Using custom cache directory: {}", dir.display());
    }

    let token = github_token.or_else(github_token_from_env);
    let authenticated = token.is_some();
    let manager = repolens_mcp::services::build_manager(token, cache_dir, ttl_seconds)?;

    repolens_mcp::transport::stdio::run_stdio_server(manager, authenticated)
        .await
        .map_err(|e| anyhow::anyhow!("Error running STDIO server: {}", e))
}

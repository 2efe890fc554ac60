//! MCP tool layer
//!
//! A thin wrapper exposing the [`services`] verbs as MCP tools. Each tool
//! returns the verb's JSON output, or an `{error, message}` body on failure.

pub mod responses;

use crate::repolens::RepositoryManager;
use crate::services;
use rmcp::{ServerHandler, model::*, schemars, tool};

/// Repository inspection tools exposed through the MCP protocol
#[derive(Clone)]
pub struct RepoLensTools {
    manager: RepositoryManager,
    authenticated: bool,
}

impl RepoLensTools {
    /// Wraps a manager; `authenticated` only feeds the server instructions
    pub fn new(manager: RepositoryManager, authenticated: bool) -> Self {
        Self {
            manager,
            authenticated,
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for RepoLensTools {
    fn get_info(&self) -> ServerInfo {
        let auth_status = if self.authenticated {
            "Authenticated with GitHub token"
        } else {
            "Not authenticated (60 requests/hour)"
        };

        let instructions = format!(
            "# RepoLens MCP Server

Inspect public GitHub repositories through a locally cached mirror.

## Authentication Status
{}

## Available Tools
- `search_doc`: Full-text search over README, docs, issues and pull requests
- `get_repo_structure`: Directory tree with per-language file counts
- `read_file`: Read one text file (1MB limit, binary files rejected)
- `get_repo_summary`: Metadata, README excerpt, recent activity and contributors
- `clear_cache`: Drop the cached mirror of one repository or of all of them

Repositories may be given as `owner/name`, `https://github.com/owner/name`,
`git@github.com:owner/name.git` or `github:owner/name`. Mirrors are refreshed
at most once per cache TTL (24 hours by default).

Failures are returned as `{{\"error\": \"<Kind>\", \"message\": \"...\"}}`.
",
            auth_status
        );

        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(instructions),
        }
    }
}

#[tool(tool_box)]
impl RepoLensTools {
    #[tool(
        description = "Search a GitHub repository's documentation, issues and pull requests. Results are ranked by relevance and grouped into documents, issues and pull_requests, together with repository facts and top contributors. Example: `{\"name\": \"search_doc\", \"arguments\": {\"repository\": \"tokio-rs/tokio\", \"query\": \"runtime shutdown\"}}`. With a limit: `{\"name\": \"search_doc\", \"arguments\": {\"repository\": \"https://github.com/serde-rs/serde\", \"query\": \"derive\", \"limit\": 5}}`"
    )]
    async fn search_doc(
        &self,
        #[tool(param)]
        #[schemars(
            description = "Repository (required): 'owner/name', 'https://github.com/owner/name', 'git@github.com:owner/name.git' or 'github:owner/name'."
        )]
        repository: String,

        #[tool(param)]
        #[schemars(description = "Search query (required), free text.")]
        query: String,

        #[tool(param)]
        #[schemars(description = "Maximum number of hits (optional, default 10, must be at least 1).")]
        limit: Option<i64>,
    ) -> Result<String, String> {
        responses::render(services::search(&self.manager, &repository, &query, limit).await)
    }

    #[tool(
        description = "List the directory tree of a GitHub repository breadth-first, with file sizes and per-language file counts. Hidden entries are skipped. Example: `{\"name\": \"get_repo_structure\", \"arguments\": {\"repository\": \"tokio-rs/tokio\"}}`. A subdirectory, two levels deep: `{\"name\": \"get_repo_structure\", \"arguments\": {\"repository\": \"tokio-rs/tokio\", \"path\": \"tokio/src\", \"depth\": 2}}`"
    )]
    async fn get_repo_structure(
        &self,
        #[tool(param)]
        #[schemars(description = "Repository (required), in any supported identifier form.")]
        repository: String,

        #[tool(param)]
        #[schemars(
            description = "Directory to start from, relative to the repository root (optional, default is the root)."
        )]
        path: Option<String>,

        #[tool(param)]
        #[schemars(
            description = "Levels to descend below the start directory (optional, default 4, capped at 10). 0 lists only the start directory's entries."
        )]
        depth: Option<i64>,
    ) -> Result<String, String> {
        responses::render(
            services::structure(&self.manager, &repository, path.as_deref(), depth).await,
        )
    }

    #[tool(
        description = "Read a text file from a GitHub repository. Returns the content with its language, size and encoding. Files over 1MB and binary files are rejected, as are paths leaving the repository. Example: `{\"name\": \"read_file\", \"arguments\": {\"repository\": \"serde-rs/serde\", \"path\": \"serde/src/lib.rs\"}}`"
    )]
    async fn read_file(
        &self,
        #[tool(param)]
        #[schemars(description = "Repository (required), in any supported identifier form.")]
        repository: String,

        #[tool(param)]
        #[schemars(description = "File path relative to the repository root (required).")]
        path: String,
    ) -> Result<String, String> {
        responses::render(services::read(&self.manager, &repository, &path).await)
    }

    #[tool(
        description = "Summarize a GitHub repository: metadata, the start of its README, the 5 most recent issues and pull requests, top contributors and language statistics. Example: `{\"name\": \"get_repo_summary\", \"arguments\": {\"repository\": \"rust-lang/regex\"}}`"
    )]
    async fn get_repo_summary(
        &self,
        #[tool(param)]
        #[schemars(description = "Repository (required), in any supported identifier form.")]
        repository: String,
    ) -> Result<String, String> {
        responses::render(services::summary(&self.manager, &repository).await)
    }

    #[tool(
        description = "Remove cached mirrors and search indexes. With a repository, clears only that one; without, clears everything. The next request fetches again. Example: `{\"name\": \"clear_cache\", \"arguments\": {\"repository\": \"tokio-rs/tokio\"}}`"
    )]
    async fn clear_cache(
        &self,
        #[tool(param)]
        #[schemars(description = "Repository to clear (optional, omit to clear all).")]
        repository: Option<String>,
    ) -> Result<String, String> {
        responses::render(services::clear_cache(&self.manager, repository.as_deref()).await)
    }
}

//! RepoLens MCP: inspect public GitHub repositories without keeping a checkout
//!
//! The library resolves a repository identifier, mirrors the repository into a
//! bounded local cache, indexes its documentation and recent activity for
//! full-text search, and serves file reads that are validated against the
//! mirror root.
//!
//! ## Layout
//!
//! - [`repolens`]: the core (mirror cache, remote client, search index, file reader, tree walker)
//! - [`services`]: the verbs `search`, `structure`, `read`, `summary` and `clear_cache`
//! - [`tools`]: the verbs exposed as MCP tools
//! - [`transport`]: the stdio MCP server
//!
//! ## Configuration
//!
//! ```bash
//! export REPOLENS_MCP_CACHE_DIR=/var/cache/repolens   # optional
//! export REPOLENS_MCP_CACHE_TTL_SECONDS=86400         # optional
//! export REPOLENS_MCP_GITHUB_TOKEN=your_github_token  # optional, GITHUB_TOKEN also works
//! ```
//!
//! ### GitHub Token
//!
//! - **Purpose**: Authenticates requests to the GitHub REST API
//! - **Requirement**: Optional. Only public repositories are supported either way
//! - **Rate Limits**:
//!   - Without token: 60 requests/hour (unauthenticated)
//!   - With token: 5,000 requests/hour (authenticated)
//!
//! A request that hits the rate limit fails with `RateLimitExceeded` and the
//! time the quota resets; the core never retries on its own.

pub mod repolens;
pub mod services;
pub mod tools;
pub mod transport;

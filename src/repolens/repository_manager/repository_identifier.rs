use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::repolens::errors::{RepositoryError, Result};

// GitHub logins: alphanumerics and single hyphens, never leading with '-', at most 39 chars.
static OWNER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9]|-[A-Za-z0-9]){0,38}$").expect("owner pattern is valid")
});

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").expect("name pattern is valid"));

const HTTPS_PREFIXES: [&str; 4] = [
    "https://github.com",
    "http://github.com",
    "https://www.github.com",
    "http://www.github.com",
];

/// Normalized `owner/name` identifier of a GitHub repository
///
/// Equality is case-sensitive and exact once the scheme, host, `.git` suffix
/// and trailing slash have been stripped, so `https://github.com/octo/demo.git`
/// and `octo/demo` name the same repository.
///
/// # Examples
///
/// ```
/// use repolens_mcp::repolens::RepositoryIdentifier;
///
/// let id: RepositoryIdentifier = "git@github.com:octo/demo.git".parse().unwrap();
/// assert_eq!(id.full_name(), "octo/demo");
/// assert_eq!(id.cache_key(), "octo__demo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepositoryIdentifier {
    owner: String,
    name: String,
}

impl RepositoryIdentifier {
    /// Parses any supported repository notation
    ///
    /// Accepted forms:
    /// - `owner/name`
    /// - `https://github.com/owner/name` (optionally with `.git` or a trailing slash)
    /// - `github.com/owner/name`
    /// - `git@github.com:owner/name.git`
    /// - `github:owner/name`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RepositoryError::InvalidIdentifier(
                "repository identifier is empty".to_string(),
            ));
        }

        let owner_and_name = if HTTPS_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
            path_from_web_url(trimmed)?
        } else if let Some(rest) = trimmed.strip_prefix("git@github.com:") {
            rest.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("ssh://git@github.com/") {
            rest.to_string()
        } else if let Some(rest) = trimmed.strip_prefix("github:") {
            rest.trim_start_matches('/').to_string()
        } else if let Some(rest) = trimmed.strip_prefix("github.com/") {
            rest.to_string()
        } else if trimmed.contains("://") || trimmed.contains('@') {
            return Err(RepositoryError::InvalidIdentifier(format!(
                "only github.com repositories are supported: {}",
                trimmed
            )));
        } else {
            trimmed.to_string()
        };

        let normalized = owner_and_name.trim_end_matches('/');
        let normalized = normalized.strip_suffix(".git").unwrap_or(normalized);

        let parts: Vec<&str> = normalized.split('/').collect();
        if parts.len() != 2 {
            return Err(RepositoryError::InvalidIdentifier(format!(
                "expected 'owner/name', got '{}'",
                input.trim()
            )));
        }
        Self::new(parts[0], parts[1])
    }

    /// Builds an identifier from already-separated parts, validating both
    pub fn new(owner: &str, name: &str) -> Result<Self> {
        if !OWNER_PATTERN.is_match(owner) {
            return Err(RepositoryError::InvalidIdentifier(format!(
                "invalid repository owner '{}'",
                owner
            )));
        }
        if !NAME_PATTERN.is_match(name) || name == "." || name == ".." {
            return Err(RepositoryError::InvalidIdentifier(format!(
                "invalid repository name '{}'",
                name
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Filesystem-safe key, `owner__name`
    ///
    /// Owners never contain underscores, so the key maps back to exactly one identifier.
    pub fn cache_key(&self) -> String {
        format!("{}__{}", self.owner, self.name)
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepositoryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryIdentifier {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn path_from_web_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| RepositoryError::InvalidIdentifier(format!("{}: {}", raw, e)))?;
    if !matches!(parsed.host_str(), Some("github.com") | Some("www.github.com")) {
        return Err(RepositoryError::InvalidIdentifier(format!(
            "only github.com repositories are supported: {}",
            raw
        )));
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(RepositoryError::InvalidIdentifier(format!(
            "repository URL must not carry a query or fragment: {}",
            raw
        )));
    }
    Ok(parsed.path().trim_start_matches('/').to_string())
}

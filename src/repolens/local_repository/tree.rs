//! Breadth-first directory listing with a depth ceiling

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{LocalRepository, detect_language, prevent_directory_traversal, to_slash_path};
use crate::repolens::config::MAX_TREE_DEPTH;
use crate::repolens::errors::{RepositoryError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Directory,
}

/// One entry of a repository tree
///
/// Files carry `size`, directories carry `children`. A directory at the depth
/// ceiling is listed with an empty `children`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Files contained in the returned tree
    pub total_files: usize,
    /// File count per detected language
    pub languages: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryTree {
    /// Start path of the walk, `""` for the repository root
    pub root: String,
    pub structure: Vec<TreeNode>,
    pub stats: TreeStats,
}

struct PendingDirectory {
    absolute: PathBuf,
    relative: String,
    depth: usize,
    node_index: Option<usize>,
}

struct ArenaNode {
    node: TreeNode,
    parent: Option<usize>,
}

impl LocalRepository {
    /// Lists the tree below `start_path` breadth-first
    ///
    /// `max_depth` is clamped to 10; depth 0 lists only the entries directly
    /// under the start path. Hidden entries are skipped, symlinks are listed
    /// as files and never followed, and siblings are sorted by name.
    pub fn walk(&self, start_path: &str, max_depth: usize) -> Result<RepositoryTree> {
        let max_depth = max_depth.min(MAX_TREE_DEPTH);
        let normalized = prevent_directory_traversal(start_path)?;
        let absolute_start = if normalized.as_os_str().is_empty() {
            self.root.canonicalize().map_err(|e| {
                RepositoryError::CacheCorrupted(format!(
                    "repository root {} is unreadable: {}",
                    self.root.display(),
                    e
                ))
            })?
        } else {
            self.resolve_within_root(&normalized, start_path)?
        };
        if !absolute_start.is_dir() {
            return Err(RepositoryError::FileNotFound(format!(
                "'{}' is not a directory",
                start_path
            )));
        }
        let start_relative = to_slash_path(&normalized);

        let mut arena: Vec<ArenaNode> = Vec::new();
        let mut stats = TreeStats::default();
        let mut queue = VecDeque::from([PendingDirectory {
            absolute: absolute_start,
            relative: start_relative.clone(),
            depth: 0,
            node_index: None,
        }]);

        while let Some(dir) = queue.pop_front() {
            let entries = match list_visible_entries(&dir.absolute) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!("Skipping unreadable directory {}: {}", dir.absolute.display(), e);
                    continue;
                }
            };

            for (name, entry) in entries {
                let path = if dir.relative.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", dir.relative, name)
                };
                // DirEntry::file_type does not follow symlinks.
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };

                if file_type.is_dir() {
                    let index = arena.len();
                    arena.push(ArenaNode {
                        node: TreeNode {
                            name,
                            path: path.clone(),
                            node_type: NodeType::Directory,
                            size: None,
                            children: Some(Vec::new()),
                        },
                        parent: dir.node_index,
                    });
                    if dir.depth < max_depth {
                        queue.push_back(PendingDirectory {
                            absolute: entry.path(),
                            relative: path,
                            depth: dir.depth + 1,
                            node_index: Some(index),
                        });
                    }
                } else {
                    let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                    stats.total_files += 1;
                    if let Some(language) = detect_language(&entry.path()) {
                        *stats.languages.entry(language.to_string()).or_insert(0) += 1;
                    }
                    arena.push(ArenaNode {
                        node: TreeNode {
                            name,
                            path,
                            node_type: NodeType::File,
                            size: Some(size),
                            children: None,
                        },
                        parent: dir.node_index,
                    });
                }
            }
        }

        Ok(RepositoryTree {
            root: start_relative,
            structure: assemble(arena),
            stats,
        })
    }
}

fn list_visible_entries(dir: &std::path::Path) -> std::io::Result<Vec<(String, std::fs::DirEntry)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        entries.push((name, entry));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// Nests the breadth-first arena into a tree
///
/// Children always come after their parent in the arena, so walking it
/// backwards finishes every directory before it is attached.
fn assemble(arena: Vec<ArenaNode>) -> Vec<TreeNode> {
    let mut children: Vec<Vec<TreeNode>> = vec![Vec::new(); arena.len()];
    let mut roots = Vec::new();

    for (index, ArenaNode { mut node, parent }) in arena.into_iter().enumerate().rev() {
        if node.node_type == NodeType::Directory {
            let mut own = std::mem::take(&mut children[index]);
            own.reverse();
            node.children = Some(own);
        }
        match parent {
            Some(parent) => children[parent].push(node),
            None => roots.push(node),
        }
    }
    roots.reverse();
    roots
}

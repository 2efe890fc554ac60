//! Structure walker: depth bounds, ordering, hidden entries and statistics

use repolens_mcp::repolens::LocalRepository;
use repolens_mcp::repolens::errors::RepositoryError;
use repolens_mcp::repolens::local_repository::{NodeType, TreeNode};

/// Builds `a/b/c/.../` nested `levels` deep with one file per level
fn deep_repo(levels: usize) -> (tempfile::TempDir, LocalRepository) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut current = dir.path().to_path_buf();
    for level in 0..levels {
        std::fs::write(current.join(format!("file{}.rs", level)), "// level").unwrap();
        current = current.join(format!("d{}", level));
        std::fs::create_dir_all(&current).unwrap();
    }
    let repo = LocalRepository::new(dir.path().to_path_buf());
    (dir, repo)
}

fn max_depth(nodes: &[TreeNode]) -> usize {
    nodes
        .iter()
        .filter_map(|n| n.children.as_ref())
        .filter(|children| !children.is_empty())
        .map(|children| 1 + max_depth(children))
        .max()
        .unwrap_or(0)
}

#[test]
fn test_depth_is_bounded() {
    let (_dir, repo) = deep_repo(8);

    for depth in [0, 1, 3] {
        let tree = repo.walk("", depth).expect("walk");
        assert_eq!(max_depth(&tree.structure), depth, "depth {}", depth);
        assert_eq!(tree.stats.total_files, depth + 1);
    }
}

#[test]
fn test_depth_is_clamped_to_ten() {
    let (_dir, repo) = deep_repo(14);
    let tree = repo.walk("", 50).expect("walk");
    assert_eq!(max_depth(&tree.structure), 10);
    assert_eq!(tree.stats.total_files, 11);
}

#[test]
fn test_siblings_are_sorted_and_hidden_entries_skipped() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for name in ["zeta.md", "Alpha.md", "beta.md", ".env", ".gitignore"] {
        std::fs::write(dir.path().join(name), "x").unwrap();
    }
    std::fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
    std::fs::create_dir_all(dir.path().join("middle")).unwrap();
    let repo = LocalRepository::new(dir.path().to_path_buf());

    let tree = repo.walk("", 4).expect("walk");
    let names: Vec<&str> = tree.structure.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha.md", "beta.md", "middle", "zeta.md"]);
    assert_eq!(tree.stats.total_files, 3);
    assert_eq!(tree.stats.languages.get("Markdown"), Some(&3));
}

#[test]
fn test_nodes_carry_size_or_children() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::create_dir_all(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "0123456789").unwrap();
    let repo = LocalRepository::new(dir.path().to_path_buf());

    let tree = repo.walk("", 2).expect("walk");
    let src = &tree.structure[0];
    assert_eq!(src.node_type, NodeType::Directory);
    assert_eq!(src.size, None);
    let lib = &src.children.as_ref().unwrap()[0];
    assert_eq!(lib.node_type, NodeType::File);
    assert_eq!(lib.path, "src/lib.rs");
    assert_eq!(lib.size, Some(10));
    assert_eq!(lib.children, None);

    let json = serde_json::to_value(&tree.structure).unwrap();
    assert_eq!(json[0]["type"], "directory");
    assert_eq!(json[0]["children"][0]["type"], "file");
    assert!(json[0].get("size").is_none());
    assert!(json[0]["children"][0].get("children").is_none());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_listed_but_not_followed() {
    let outside = tempfile::tempdir().expect("Failed to create temp dir");
    std::fs::write(outside.path().join("secret.rs"), "x").unwrap();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    std::os::unix::fs::symlink(outside.path(), dir.path().join("linked")).unwrap();
    let repo = LocalRepository::new(dir.path().to_path_buf());

    let tree = repo.walk("", 5).expect("walk");
    assert_eq!(tree.structure.len(), 1);
    assert_eq!(tree.structure[0].name, "linked");
    assert_eq!(tree.structure[0].node_type, NodeType::File);
    assert_eq!(tree.stats.languages.get("Rust"), None);
}

#[test]
fn test_start_path_scopes_the_walk() {
    let (_dir, repo) = deep_repo(4);
    let tree = repo.walk("d0/d1", 0).expect("walk");
    assert_eq!(tree.root, "d0/d1");
    let paths: Vec<&str> = tree.structure.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["d0/d1/d2", "d0/d1/file2.rs"]);
}

#[test]
fn test_invalid_start_paths_are_rejected() {
    let (_dir, repo) = deep_repo(2);
    assert!(matches!(
        repo.walk("../..", 2),
        Err(RepositoryError::PathTraversalRejected(_))
    ));
    assert!(matches!(
        repo.walk("missing", 2),
        Err(RepositoryError::FileNotFound(_))
    ));
    assert!(matches!(
        repo.walk("file0.rs", 2),
        Err(RepositoryError::FileNotFound(_))
    ));
}

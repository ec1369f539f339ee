use super::IgnoreMatcher;
use crate::error::Result;
use crate::util::relative_key;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file that survived filtering during discovery
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Discover indexable files under `root` in depth-first order.
///
/// Directories matching the ignore matcher are pruned, never descended.
/// Files are kept when they are not excluded and their extension is on the
/// allow-list (entries carry a leading dot, compared case-insensitively).
/// Unreadable directory entries are logged and skipped.
pub fn discover_files(
    root: &Path,
    matcher: &IgnoreMatcher,
    text_extensions: &[String],
) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();

    let walk = WalkDir::new(root).into_iter().filter_entry(|entry| {
        match relative_key(root, entry.path()) {
            // Never prune the root itself (its relative key is empty)
            Some(rel) if rel.is_empty() => true,
            Some(rel) => !matcher.is_excluded(&rel, entry.file_type().is_dir()),
            None => true,
        }
    });

    for entry in walk {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !extension_allowed(entry.path(), text_extensions) {
            continue;
        }
        let Some(relative_path) = relative_key(root, entry.path()) else {
            continue;
        };
        files.push(FileEntry {
            relative_path,
            absolute_path: entry.path().to_path_buf(),
        });
    }

    log::debug!("discovered {} indexable files in {}", files.len(), root.display());
    Ok(files)
}

fn extension_allowed(path: &Path, text_extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{}", ext.to_lowercase());
    text_extensions.iter().any(|allowed| allowed.to_lowercase() == dotted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn exts() -> Vec<String> {
        vec![".py".to_string(), ".rs".to_string(), ".md".to_string()]
    }

    fn discover(root: &Path, patterns: &[&str]) -> Vec<String> {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        let matcher = IgnoreMatcher::new(root, &patterns).unwrap();
        let mut paths: Vec<String> = discover_files(root, &matcher, &exts())
            .unwrap()
            .into_iter()
            .map(|f| f.relative_path)
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn test_discover_filters_extensions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("main.py"), "x = 1\n").unwrap();
        fs::write(root.join("lib.rs"), "fn f() {}\n").unwrap();
        fs::write(root.join("image.png"), b"\x89PNG").unwrap();
        fs::write(root.join("Makefile"), "all:\n").unwrap();

        let paths = discover(root, &[]);
        assert_eq!(paths, vec!["lib.rs", "main.py"]);
    }

    #[test]
    fn test_discover_recurses_with_forward_slashes() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("src").join("nested")).unwrap();
        fs::write(root.join("src/nested/deep.py"), "pass\n").unwrap();

        let paths = discover(root, &[]);
        assert_eq!(paths, vec!["src/nested/deep.py"]);
    }

    #[test]
    fn test_excluded_directory_is_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.py"), "x\n").unwrap();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/app.py"), "y\n").unwrap();

        let paths = discover(root, &["node_modules"]);
        assert_eq!(paths, vec!["src/app.py"]);
    }

    #[test]
    fn test_excluded_file_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join("keep.py"), "k\n").unwrap();
        fs::write(root.join("skip.pyc.py"), "s\n").unwrap();

        let paths = discover(root, &["skip*"]);
        assert_eq!(paths, vec!["keep.py"]);
    }

    #[test]
    fn test_gitignore_prunes_walk() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/out.py"), "g\n").unwrap();
        fs::write(root.join("kept.py"), "k\n").unwrap();

        let paths = discover(root, &[]);
        assert_eq!(paths, vec!["kept.py"]);
    }

    #[test]
    fn test_empty_project() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover(temp_dir.path(), &[]).is_empty());
    }
}

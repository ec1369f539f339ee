use crate::error::{BridgeError, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;

/// Decides whether a path is excluded from indexing.
///
/// Combines the configured exclude patterns with the project root's
/// `.gitignore`, when one exists. Built once per indexing pass; the parsed
/// `.gitignore` is held for the duration so the file is read a single time.
///
/// Configured pattern classes:
/// - literal or `*`/`?` wildcard match against any single path segment
/// - trailing `/` marks a directory-only pattern matching any component chain
/// - the whole relative path is also tried as a glob
///
/// Matching is case-sensitive over forward-slash paths. Directory exclusion
/// is checked during the walk so excluded trees are pruned, not descended.
pub struct IgnoreMatcher {
    segment_set: GlobSet,
    dir_set: GlobSet,
    full_set: GlobSet,
    gitignore: Option<Gitignore>,
}

impl IgnoreMatcher {
    pub fn new(project_root: &Path, exclude_patterns: &[String]) -> Result<Self> {
        let mut segments = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();
        let mut fulls = GlobSetBuilder::new();

        for pattern in exclude_patterns {
            let glob_err = |e: globset::Error| {
                BridgeError::Config(format!("invalid exclude pattern {}: {}", pattern, e))
            };

            if let Some(dir_name) = pattern.strip_suffix('/') {
                dirs.add(Glob::new(dir_name).map_err(glob_err)?);
                continue;
            }
            segments.add(Glob::new(pattern).map_err(glob_err)?);
            fulls.add(Glob::new(pattern).map_err(glob_err)?);
        }

        let glob_build_err =
            |e: globset::Error| BridgeError::Config(format!("exclude pattern set: {}", e));

        let gitignore_path = project_root.join(".gitignore");
        let gitignore = if gitignore_path.exists() {
            let mut builder = GitignoreBuilder::new(project_root);
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!("ignoring unreadable .gitignore at {}: {}", gitignore_path.display(), e);
                None
            } else {
                builder.build().ok()
            }
        } else {
            None
        };

        Ok(Self {
            segment_set: segments.build().map_err(glob_build_err)?,
            dir_set: dirs.build().map_err(glob_build_err)?,
            full_set: fulls.build().map_err(glob_build_err)?,
            gitignore,
        })
    }

    /// Whether `relative_path` (forward slashes, relative to the project
    /// root) is excluded. `is_dir` selects directory semantics for
    /// trailing-`/` patterns and for `.gitignore` matching.
    pub fn is_excluded(&self, relative_path: &str, is_dir: bool) -> bool {
        if relative_path.is_empty() {
            return false;
        }

        let segments: Vec<&str> = relative_path.split('/').collect();

        if segments.iter().any(|s| self.segment_set.is_match(s)) {
            return true;
        }

        // Directory-only patterns apply to every directory on the component
        // chain: all segments of a directory path, all but the last of a file
        let dir_segments = if is_dir {
            &segments[..]
        } else {
            &segments[..segments.len() - 1]
        };
        if dir_segments.iter().any(|s| self.dir_set.is_match(s)) {
            return true;
        }

        if self.full_set.is_match(relative_path) {
            return true;
        }

        if let Some(gitignore) = &self.gitignore {
            if gitignore
                .matched_path_or_any_parents(relative_path, is_dir)
                .is_ignore()
            {
                return true;
            }
        }

        false
    }
}

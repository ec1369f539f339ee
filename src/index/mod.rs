pub mod decoder;
pub mod ignore;
pub mod manager;
pub mod registry;
pub mod splitter;
pub mod walker;

use sha2::{Digest, Sha256};

pub use ignore::IgnoreMatcher;
pub use manager::IndexManager;
pub use registry::ProjectRegistry;
pub use splitter::split_blobs;
pub use walker::{discover_files, FileEntry};

/// One contentful fragment of one file, the unit of upload.
///
/// `path` is relative to the project root with forward slashes; `fragment`
/// is set when the file was split into multiple line-bounded pieces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub path: String,
    pub fragment: Option<usize>,
    pub content: String,
    identity: String,
}

impl Blob {
    pub fn new(path: String, fragment: Option<usize>, content: String) -> Self {
        let identity = compute_identity(&label_for(&path, fragment), &content);
        Self {
            path,
            fragment,
            content,
            identity,
        }
    }

    /// Upload label: the relative path, with a `#n` suffix for split files
    pub fn label(&self) -> String {
        label_for(&self.path, self.fragment)
    }

    /// Content address: stable across runs and platforms for equal inputs
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

fn label_for(path: &str, fragment: Option<usize>) -> String {
    match fragment {
        Some(n) => format!("{}#{}", path, n),
        None => path.to_string(),
    }
}

/// Hex SHA-256 over the fragment label followed by the content bytes
fn compute_identity(label: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(label.as_bytes());
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_deterministic() {
        let a = Blob::new("src/lib.rs".to_string(), None, "fn main() {}".to_string());
        let b = Blob::new("src/lib.rs".to_string(), None, "fn main() {}".to_string());
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.identity().len(), 64);
        assert!(a.identity().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_identity_depends_on_path_and_content() {
        let base = Blob::new("a.py".to_string(), None, "x = 1\n".to_string());
        let other_path = Blob::new("b.py".to_string(), None, "x = 1\n".to_string());
        let other_content = Blob::new("a.py".to_string(), None, "x = 2\n".to_string());
        assert_ne!(base.identity(), other_path.identity());
        assert_ne!(base.identity(), other_content.identity());
    }

    #[test]
    fn test_fragment_label_and_identity() {
        let whole = Blob::new("big.py".to_string(), None, "line\n".to_string());
        let first = Blob::new("big.py".to_string(), Some(0), "line\n".to_string());
        assert_eq!(whole.label(), "big.py");
        assert_eq!(first.label(), "big.py#0");
        // The fragment suffix participates in the hash
        assert_ne!(whole.identity(), first.identity());
    }

    #[test]
    fn test_known_digest() {
        // sha256("a.py" + "hi\n") pinned so the address stays stable across releases
        let blob = Blob::new("a.py".to_string(), None, "hi\n".to_string());
        let mut hasher = Sha256::new();
        hasher.update(b"a.py");
        hasher.update(b"hi\n");
        assert_eq!(blob.identity(), format!("{:x}", hasher.finalize()));
    }
}

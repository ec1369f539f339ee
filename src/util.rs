use crate::error::{BridgeError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Longest accepted project root path, in characters
pub const MAX_PATH_LENGTH: usize = 4096;

/// Number of characters left visible at each end of a masked token
const TOKEN_VISIBLE_CHARS: usize = 4;

fn bearer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Bearer\s+[\w.-]+").unwrap())
}

fn api_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(api[_-]?key|apikey)\s*[=:]\s*[\w.-]+").unwrap())
}

fn password_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(password|passwd|pwd)\s*[=:]\s*\S+").unwrap())
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(token)\s*[=:]\s*[\w.-]+").unwrap())
}

/// Mask a bearer token for display, keeping a few characters at each end.
///
/// Tokens too short to keep anything visible are masked entirely.
pub fn mask_token(token: &str) -> String {
    if token.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= TOKEN_VISIBLE_CHARS * 2 {
        return "*".repeat(chars.len());
    }
    let prefix: String = chars[..TOKEN_VISIBLE_CHARS].iter().collect();
    let suffix: String = chars[chars.len() - TOKEN_VISIBLE_CHARS..].iter().collect();
    format!("{}****{}", prefix, suffix)
}

/// Mask sensitive substrings (bearer tokens, API keys, passwords, tokens)
/// in arbitrary text. Applied by the logging format hook to every record.
pub fn mask_sensitive_data(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let masked = bearer_re().replace_all(text, "Bearer ****");
    let masked = api_key_re().replace_all(&masked, "$1=****");
    let masked = password_re().replace_all(&masked, "$1=****");
    token_re().replace_all(&masked, "$1=****").into_owned()
}

/// Check that a string is a well-formed http/https URL
pub fn validate_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Check an allow-list extension entry: must start with '.' followed by an
/// alphanumeric, then any of [A-Za-z0-9._+-] (covers compound forms like ".d.ts")
pub fn validate_file_extension(ext: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\.[A-Za-z0-9][A-Za-z0-9._+-]*$").unwrap());
    re.is_match(ext)
}

/// Reject exclude patterns that point at system roots or contain traversal
pub fn validate_exclude_pattern(pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    const DANGEROUS_PREFIXES: &[&str] = &[
        "/etc",
        "/sys",
        "/proc",
        "/dev",
        "/boot",
        "/root",
        "C:\\Windows",
        "C:\\System",
    ];

    if DANGEROUS_PREFIXES.iter().any(|p| pattern.starts_with(p)) {
        return false;
    }

    !pattern.contains("..")
}

/// Normalize a path to forward slashes for matching and registry keys
pub fn normalize_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

/// Validate a project root string and resolve it to the canonical project key.
///
/// Accepts forward slashes on all platforms. The returned key is the
/// canonicalized absolute path with forward slashes, which makes a symlinked
/// root and its target map to the same registry entry.
///
/// The caller-facing message is deliberately generic; the specific reason is
/// logged at warn level instead.
pub fn validate_project_root(raw: &str) -> Result<String> {
    let invalid = || BridgeError::InvalidInput("invalid project_root_path".to_string());

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        log::warn!("project_root_path is empty");
        return Err(invalid());
    }
    if trimmed.chars().count() > MAX_PATH_LENGTH {
        log::warn!("project_root_path exceeds {} characters", MAX_PATH_LENGTH);
        return Err(invalid());
    }
    if trimmed.contains("..") {
        log::warn!("project_root_path contains traversal: {}", trimmed);
        return Err(invalid());
    }

    let path = PathBuf::from(trimmed);
    if !path.is_absolute() {
        log::warn!("project_root_path is not absolute: {}", trimmed);
        return Err(invalid());
    }

    // Resolves symlinks and fails for nonexistent paths
    let canonical = match std::fs::canonicalize(&path) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("project_root_path does not resolve: {}: {}", trimmed, e);
            return Err(invalid());
        }
    };

    if !canonical.is_dir() {
        log::warn!("project_root_path is not a directory: {}", trimmed);
        return Err(invalid());
    }
    if let Err(e) = std::fs::read_dir(&canonical) {
        log::warn!("project_root_path is not readable: {}: {}", trimmed, e);
        return Err(invalid());
    }

    Ok(normalize_slashes(&canonical.to_string_lossy()))
}

/// Relative path of `path` under `root`, forward-slash normalized
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| normalize_slashes(&rel.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token("1234567890abcdef"), "1234****cdef");
        assert_eq!(mask_token("short"), "*****");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn test_mask_sensitive_data_bearer() {
        let masked = mask_sensitive_data("Authorization: Bearer abc123.xyz-45");
        assert_eq!(masked, "Authorization: Bearer ****");
    }

    #[test]
    fn test_mask_sensitive_data_key_value_forms() {
        assert_eq!(mask_sensitive_data("api_key=sk123456"), "api_key=****");
        assert_eq!(mask_sensitive_data("password: hunter2!"), "password=****");
        assert_eq!(mask_sensitive_data("TOKEN=deadbeef"), "TOKEN=****");
        // Plain text stays untouched
        assert_eq!(mask_sensitive_data("indexed 4 files"), "indexed 4 files");
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://api.example.com/v1"));
        assert!(validate_url("http://localhost:8080"));
        assert!(!validate_url("not-a-url"));
        assert!(!validate_url("ftp://example.com"));
        assert!(!validate_url(""));
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension(".py"));
        assert!(validate_file_extension(".d.ts"));
        assert!(validate_file_extension(".tar.gz"));
        assert!(!validate_file_extension("py"));
        assert!(!validate_file_extension("."));
        assert!(!validate_file_extension(""));
    }

    #[test]
    fn test_validate_exclude_pattern() {
        assert!(validate_exclude_pattern("*.log"));
        assert!(validate_exclude_pattern("node_modules"));
        assert!(!validate_exclude_pattern("/etc/*"));
        assert!(!validate_exclude_pattern("../secrets"));
        assert!(!validate_exclude_pattern(""));
    }

    #[test]
    fn test_validate_project_root_rejects_traversal() {
        let err = validate_project_root("../etc/passwd").unwrap_err();
        assert_eq!(err.to_string(), "invalid project_root_path");
    }

    #[test]
    fn test_validate_project_root_rejects_relative_and_missing() {
        assert!(validate_project_root("relative/path").is_err());
        assert!(validate_project_root("/definitely/not/a/real/dir-xyz").is_err());
        assert!(validate_project_root("   ").is_err());
    }

    #[test]
    fn test_validate_project_root_rejects_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(validate_project_root(file.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_validate_project_root_canonicalizes() {
        let temp_dir = TempDir::new().unwrap();
        let key = validate_project_root(temp_dir.path().to_str().unwrap()).unwrap();
        let expected = temp_dir.path().canonicalize().unwrap();
        assert_eq!(key, normalize_slashes(&expected.to_string_lossy()));
        assert!(!key.contains('\\'));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_project_root_resolves_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("real");
        std::fs::create_dir(&target).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let key_via_link = validate_project_root(link.to_str().unwrap()).unwrap();
        let key_direct = validate_project_root(target.to_str().unwrap()).unwrap();
        assert_eq!(key_via_link, key_direct);
    }
}

use crate::error::{BridgeError, Result};
use crate::util::{mask_token, validate_exclude_pattern, validate_file_extension, validate_url};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 100;
const MIN_LINES_PER_BLOB: usize = 100;
const MAX_LINES_PER_BLOB: usize = 10_000;
const MIN_RETRY_DELAY: f64 = 0.1;
const MAX_RETRY_DELAY: f64 = 60.0;

/// Unconfigured-token sentinel shipped in the default settings file.
/// A token still carrying this prefix refuses to index.
pub const TOKEN_SENTINEL_PREFIX: &str = "your-token-here";

/// Immutable settings snapshot for one server process.
///
/// Captured once at startup from the settings file, `CTXBRIDGE_*` environment
/// variables, and command-line overrides, in that precedence order. Editing
/// the file while the server runs has no effect until restart; hot reload is
/// the configuration collaborator's concern.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub batch_size: usize,
    pub max_lines_per_blob: usize,
    pub max_concurrent_uploads: usize,
    pub max_retries: u32,
    pub retry_delay: f64,
    pub base_url: String,
    pub token: String,
    pub text_extensions: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Directory holding the project registry. Not read from the settings
    /// file; resolved from the user data dir (or CTXBRIDGE_DATA_DIR).
    #[serde(skip)]
    pub index_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_lines_per_blob: 800,
            max_concurrent_uploads: 3,
            max_retries: 3,
            retry_delay: 1.0,
            base_url: "https://api.example.com/v1".to_string(),
            token: "your-token-here-please-configure".to_string(),
            text_extensions: [
                ".py", ".js", ".ts", ".jsx", ".tsx", ".java", ".go", ".rs", ".cpp", ".c",
                ".h", ".hpp", ".cs", ".rb", ".php", ".md", ".txt", ".json", ".yaml", ".yml",
                ".toml", ".xml", ".html", ".css", ".scss", ".sql", ".sh", ".bash",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_patterns: [
                ".venv",
                "venv",
                ".env",
                "env",
                "node_modules",
                ".git",
                ".svn",
                ".hg",
                "__pycache__",
                ".pytest_cache",
                ".mypy_cache",
                ".tox",
                ".eggs",
                "*.egg-info",
                "dist",
                "build",
                ".idea",
                ".vscode",
                ".DS_Store",
                "*.pyc",
                "*.pyo",
                "*.pyd",
                ".coverage",
                "htmlcov",
                ".gradle",
                "target",
                "bin",
                "obj",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            index_dir: PathBuf::new(),
        }
    }
}

impl Settings {
    /// Load the settings snapshot.
    ///
    /// Loads environment variables from .env (if present) first, then merges:
    /// 1. `settings.toml` under the user config dir (CTXBRIDGE_CONFIG overrides
    ///    the location); a commented default file is created on first run
    /// 2. `CTXBRIDGE_*` environment variable overrides
    /// 3. command-line overrides for base URL and token
    pub fn load(cli_base_url: Option<String>, cli_token: Option<String>) -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = match std::env::var("CTXBRIDGE_CONFIG") {
            Ok(p) => PathBuf::from(p),
            Err(_) => default_config_path()?,
        };

        let mut settings = if config_path.exists() {
            let raw = std::fs::read_to_string(&config_path).map_err(|e| {
                BridgeError::Config(format!(
                    "failed to read settings file {}: {}",
                    config_path.display(),
                    e
                ))
            })?;
            toml::from_str::<Settings>(&raw).map_err(|e| {
                BridgeError::Config(format!(
                    "failed to parse settings file {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            write_default_settings(&config_path)?;
            Settings::default()
        };

        settings.apply_env_overrides()?;

        if let Some(url) = cli_base_url {
            settings.base_url = url;
        }
        if let Some(token) = cli_token {
            settings.token = token;
        }

        settings.index_dir = match std::env::var("CTXBRIDGE_DATA_DIR") {
            Ok(p) => PathBuf::from(p),
            Err(_) => default_data_dir()?,
        };
        std::fs::create_dir_all(&settings.index_dir).map_err(|e| {
            BridgeError::Config(format!(
                "failed to create data directory {}: {}",
                settings.index_dir.display(),
                e
            ))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        fn parsed<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
            raw.parse::<T>()
                .map_err(|_| BridgeError::Config(format!("invalid value for {}: {}", name, raw)))
        }

        if let Ok(v) = std::env::var("CTXBRIDGE_BATCH_SIZE") {
            self.batch_size = parsed("CTXBRIDGE_BATCH_SIZE", &v)?;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_MAX_LINES_PER_BLOB") {
            self.max_lines_per_blob = parsed("CTXBRIDGE_MAX_LINES_PER_BLOB", &v)?;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_MAX_CONCURRENT_UPLOADS") {
            self.max_concurrent_uploads = parsed("CTXBRIDGE_MAX_CONCURRENT_UPLOADS", &v)?;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_MAX_RETRIES") {
            self.max_retries = parsed("CTXBRIDGE_MAX_RETRIES", &v)?;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_RETRY_DELAY") {
            self.retry_delay = parsed("CTXBRIDGE_RETRY_DELAY", &v)?;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_BASE_URL") {
            self.base_url = v;
        }
        if let Ok(v) = std::env::var("CTXBRIDGE_TOKEN") {
            self.token = v;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(BridgeError::Config("base_url must be configured".to_string()));
        }
        if !validate_url(&self.base_url) {
            return Err(BridgeError::Config(format!(
                "base_url must be a valid HTTP/HTTPS URL: {}",
                self.base_url
            )));
        }
        if self.token.is_empty() {
            return Err(BridgeError::Config("token must be configured".to_string()));
        }

        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(BridgeError::Config(format!(
                "batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE, MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if !(MIN_LINES_PER_BLOB..=MAX_LINES_PER_BLOB).contains(&self.max_lines_per_blob) {
            return Err(BridgeError::Config(format!(
                "max_lines_per_blob must be between {} and {}, got {}",
                MIN_LINES_PER_BLOB, MAX_LINES_PER_BLOB, self.max_lines_per_blob
            )));
        }
        if !(1..=100).contains(&self.max_concurrent_uploads) {
            return Err(BridgeError::Config(format!(
                "max_concurrent_uploads must be between 1 and 100, got {}",
                self.max_concurrent_uploads
            )));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(BridgeError::Config(format!(
                "max_retries must be between 1 and 10, got {}",
                self.max_retries
            )));
        }
        if !(MIN_RETRY_DELAY..=MAX_RETRY_DELAY).contains(&self.retry_delay) {
            return Err(BridgeError::Config(format!(
                "retry_delay must be between {} and {} seconds, got {}",
                MIN_RETRY_DELAY, MAX_RETRY_DELAY, self.retry_delay
            )));
        }

        for ext in &self.text_extensions {
            if !validate_file_extension(ext) {
                return Err(BridgeError::Config(format!(
                    "invalid file extension format (must start with '.'): {}",
                    ext
                )));
            }
        }
        for pattern in &self.exclude_patterns {
            if !validate_exclude_pattern(pattern) {
                return Err(BridgeError::Config(format!(
                    "invalid or dangerous exclude pattern: {}",
                    pattern
                )));
            }
        }

        Ok(())
    }

    /// Whether the token is still the shipped placeholder (or empty)
    pub fn token_is_unconfigured(&self) -> bool {
        self.token.is_empty() || self.token.starts_with(TOKEN_SENTINEL_PREFIX)
    }

    /// Token with only a few characters visible, for startup logging
    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }

    /// Path of the project registry file
    pub fn registry_path(&self) -> PathBuf {
        self.index_dir.join("projects.json")
    }
}

fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| BridgeError::Config("cannot determine user config directory".to_string()))?;
    Ok(base.join("ctxbridge").join("settings.toml"))
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .ok_or_else(|| BridgeError::Config("cannot determine user data directory".to_string()))?;
    Ok(base.join("ctxbridge"))
}

/// Write a commented default settings file so the first run leaves something
/// editable behind. Owner-only permissions on Unix since it holds the token.
fn write_default_settings(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            BridgeError::Config(format!(
                "failed to create config directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let defaults = Settings::default();
    let mut body = String::from("# ctxbridge settings\n# token must be replaced before indexing works\n\n");
    body.push_str(&format!("batch_size = {}\n", defaults.batch_size));
    body.push_str(&format!("max_lines_per_blob = {}\n", defaults.max_lines_per_blob));
    body.push_str(&format!(
        "max_concurrent_uploads = {}\n",
        defaults.max_concurrent_uploads
    ));
    body.push_str(&format!("max_retries = {}\n", defaults.max_retries));
    body.push_str(&format!("retry_delay = {}\n", defaults.retry_delay));
    body.push_str(&format!("base_url = {:?}\n", defaults.base_url));
    body.push_str(&format!("token = {:?}\n", defaults.token));
    body.push_str(&format!(
        "text_extensions = {}\n",
        toml_string_array(&defaults.text_extensions)
    ));
    body.push_str(&format!(
        "exclude_patterns = {}\n",
        toml_string_array(&defaults.exclude_patterns)
    ));

    std::fs::write(path, body)
        .map_err(|e| BridgeError::Config(format!("failed to write {}: {}", path.display(), e)))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .map_err(|e| BridgeError::Config(format!("failed to chmod {}: {}", path.display(), e)))?;
    }

    log::info!("created default settings file: {}", path.display());
    Ok(())
}

fn toml_string_array(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("{:?}", s)).collect();
    format!("[{}]", quoted.join(", "))
}

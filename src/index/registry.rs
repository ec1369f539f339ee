use crate::error::{BridgeError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Serializes every load→merge→save cycle in this process. The registry is
/// written whole, so interleaved writers would drop each other's unions.
static REGISTRY_LOCK: Mutex<()> = Mutex::const_new(());

type RegistryMap = BTreeMap<String, BTreeSet<String>>;

/// Persistent mapping from project key to the blob identities the remote API
/// has acknowledged for that project.
///
/// Stored as a single JSON document, written atomically (temp file + rename)
/// so readers never observe a half-written file. The mapping is additive:
/// identities are only ever unioned in, and projects are never removed.
/// Cross-process writers are not coordinated; the tool server is expected to
/// be the only process touching the file.
pub struct ProjectRegistry {
    path: PathBuf,
}

impl ProjectRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Identities currently recorded for `project_key` (empty when the
    /// project or the registry file does not exist yet)
    pub async fn get(&self, project_key: &str) -> Result<BTreeSet<String>> {
        let _guard = REGISTRY_LOCK.lock().await;
        let map = load_map(&self.path)?;
        Ok(map.get(project_key).cloned().unwrap_or_default())
    }

    /// Union `confirmed` into the project's entry and persist, returning the
    /// post-merge identity set.
    ///
    /// An empty confirmation set is a no-op read: nothing changed, so the
    /// file is not rewritten.
    pub async fn merge_and_save(
        &self,
        project_key: &str,
        confirmed: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>> {
        let _guard = REGISTRY_LOCK.lock().await;

        let mut map = load_map(&self.path)?;
        if confirmed.is_empty() {
            return Ok(map.get(project_key).cloned().unwrap_or_default());
        }

        let entry = map.entry(project_key.to_string()).or_default();
        entry.extend(confirmed.iter().cloned());
        let merged = entry.clone();

        save_map(&self.path, &map)?;
        log::debug!(
            "registry merged {} identities for {} ({} total)",
            confirmed.len(),
            project_key,
            merged.len()
        );
        Ok(merged)
    }
}

fn load_map(path: &Path) -> Result<RegistryMap> {
    if !path.exists() {
        return Ok(RegistryMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| BridgeError::RegistryCorrupt(format!("{}: {}", path.display(), e)))
}

fn save_map(path: &Path, map: &RegistryMap) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Write the whole document to a sibling temp file, then rename over the
    // destination so a crash never leaves a partial registry
    let temp_path = path.with_extension("json.tmp");
    let body = serde_json::to_string_pretty(map)
        .map_err(|e| BridgeError::RegistryCorrupt(format!("serialize: {}", e)))?;
    std::fs::write(&temp_path, body)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

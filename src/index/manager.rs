use super::{decoder, splitter, walker, Blob, IgnoreMatcher, ProjectRegistry};
use crate::api::ApiClient;
use crate::config::Settings;
use crate::error::{BridgeError, Result};
use crate::util::validate_project_root;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Pending uploads are capped at this many batches per in-flight slot, which
/// bounds buffered blobs to `batch_size * max_concurrent_uploads * 4`
const PENDING_BATCHES_PER_SLOT: usize = 4;

const MAX_QUERY_LENGTH: usize = 10_000;

/// Drives incremental indexing and search for one server process.
///
/// Each `search_context` call runs one indexing pass (walk, decode, split,
/// diff against the registry, upload what is new) and then a single search
/// over the project's post-merge identity set.
pub struct IndexManager {
    settings: Settings,
    registry: ProjectRegistry,
    client: ApiClient,
}

impl IndexManager {
    pub fn new(settings: Settings) -> Result<Self> {
        let client = ApiClient::new(&settings)?;
        let registry = ProjectRegistry::new(settings.registry_path());
        Ok(Self {
            settings,
            registry,
            client,
        })
    }

    /// The single client-visible operation: index the project incrementally,
    /// then search the remote index for the query.
    ///
    /// Upload failures for individual batches are logged and skipped, so a
    /// partially indexed pass still searches over whatever was confirmed.
    pub async fn search_context(&self, project_root: &str, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(BridgeError::InvalidInput("query is required".to_string()));
        }
        if query.chars().count() > MAX_QUERY_LENGTH {
            return Err(BridgeError::InvalidInput(format!(
                "query is too long (max {} characters)",
                MAX_QUERY_LENGTH
            )));
        }
        if self.settings.token_is_unconfigured() {
            return Err(BridgeError::Config("token not configured".to_string()));
        }

        let project_key = validate_project_root(project_root)?;

        let started = std::time::Instant::now();
        let identities = self.index_project(&project_key).await?;
        log::info!(
            "indexing pass for {} finished in {:.2}s ({} identities known)",
            project_key,
            started.elapsed().as_secs_f64(),
            identities.len()
        );

        let ordered: Vec<String> = identities.into_iter().collect();
        self.client.search(query, &ordered).await
    }

    /// One incremental pass. Returns the project's post-merge identity set.
    async fn index_project(&self, project_key: &str) -> Result<BTreeSet<String>> {
        let root = Path::new(project_key);
        let matcher = IgnoreMatcher::new(root, &self.settings.exclude_patterns)?;
        let known = self.registry.get(project_key).await?;
        let files = walker::discover_files(root, &matcher, &self.settings.text_extensions)?;

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_uploads));
        let max_pending = self.settings.max_concurrent_uploads * PENDING_BATCHES_PER_SLOT;
        let mut uploads: JoinSet<Result<Vec<String>>> = JoinSet::new();
        let mut confirmed: BTreeSet<String> = BTreeSet::new();
        let mut failed_batches = 0usize;

        let mut batch: Vec<Blob> = Vec::with_capacity(self.settings.batch_size);
        let mut new_blobs = 0usize;

        for file in &files {
            let text = match decoder::decode_file(&file.absolute_path) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("skipping {}: {}", file.relative_path, e);
                    continue;
                }
            };
            for blob in splitter::split_blobs(&file.relative_path, &text, self.settings.max_lines_per_blob)
            {
                if known.contains(blob.identity()) {
                    continue;
                }
                new_blobs += 1;
                batch.push(blob);
                if batch.len() == self.settings.batch_size {
                    let full = std::mem::replace(
                        &mut batch,
                        Vec::with_capacity(self.settings.batch_size),
                    );
                    self.dispatch_batch(
                        &mut uploads,
                        &semaphore,
                        full,
                        max_pending,
                        &mut confirmed,
                        &mut failed_batches,
                    )
                    .await;
                }
            }
        }
        if !batch.is_empty() {
            self.dispatch_batch(
                &mut uploads,
                &semaphore,
                batch,
                max_pending,
                &mut confirmed,
                &mut failed_batches,
            )
            .await;
        }

        while let Some(joined) = uploads.join_next().await {
            collect_batch_result(joined, &mut confirmed, &mut failed_batches);
        }

        if new_blobs == 0 {
            log::info!("{}: nothing new to upload", project_key);
            return Ok(known);
        }
        log::info!(
            "{}: {} new blobs, {} confirmed, {} batches failed",
            project_key,
            new_blobs,
            confirmed.len(),
            failed_batches
        );

        self.registry.merge_and_save(project_key, &confirmed).await
    }

    /// Spawn one batch upload, first harvesting finished tasks until the
    /// pending window has room. The semaphore bounds how many requests are
    /// actually in flight; the window bounds how many blobs wait in memory.
    async fn dispatch_batch(
        &self,
        uploads: &mut JoinSet<Result<Vec<String>>>,
        semaphore: &Arc<Semaphore>,
        batch: Vec<Blob>,
        max_pending: usize,
        confirmed: &mut BTreeSet<String>,
        failed_batches: &mut usize,
    ) {
        while uploads.len() >= max_pending {
            if let Some(joined) = uploads.join_next().await {
                collect_batch_result(joined, confirmed, failed_batches);
            }
        }

        let client = self.client.clone();
        let semaphore = Arc::clone(semaphore);
        uploads.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("upload semaphore closed");
            client.upload_batch(&batch).await
        });
    }
}

fn collect_batch_result(
    joined: std::result::Result<Result<Vec<String>>, tokio::task::JoinError>,
    confirmed: &mut BTreeSet<String>,
    failed_batches: &mut usize,
) {
    match joined {
        Ok(Ok(identities)) => confirmed.extend(identities),
        Ok(Err(e)) => {
            *failed_batches += 1;
            log::warn!("batch upload failed, skipping: {}", e);
        }
        Err(e) => {
            *failed_batches += 1;
            log::warn!("batch upload task did not complete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager_with(temp_dir: &TempDir, token: &str) -> IndexManager {
        let settings = Settings {
            token: token.to_string(),
            index_dir: temp_dir.path().to_path_buf(),
            ..Settings::default()
        };
        IndexManager::new(settings).unwrap()
    }

    #[tokio::test]
    async fn test_traversal_path_rejected_before_any_walk() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_with(&temp_dir, "configured-token-xyz");

        let err = manager
            .search_context("../etc/passwd", "find the config")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid project_root_path");
    }

    #[tokio::test]
    async fn test_empty_and_oversize_query_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_with(&temp_dir, "configured-token-xyz");
        let root = temp_dir.path().to_str().unwrap().to_string();

        let err = manager.search_context(&root, "   ").await.unwrap_err();
        assert_eq!(err.to_string(), "query is required");

        let huge = "q".repeat(10_001);
        let err = manager.search_context(&root, &huge).await.unwrap_err();
        assert!(err.to_string().contains("query is too long"));
    }

    #[tokio::test]
    async fn test_sentinel_token_refused() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_with(&temp_dir, "your-token-here-please-configure");
        let root = temp_dir.path().to_str().unwrap().to_string();

        let err = manager.search_context(&root, "anything").await.unwrap_err();
        assert_eq!(err.to_string(), "token not configured");
    }

    #[tokio::test]
    async fn test_unchanged_project_has_nothing_to_upload() {
        let data_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        std::fs::write(project_dir.path().join("a.py"), "x = 1\n").unwrap();

        let settings = Settings {
            token: "configured-token-xyz".to_string(),
            index_dir: data_dir.path().to_path_buf(),
            // An unroutable endpoint: any accidental upload fails fast
            base_url: "http://127.0.0.1:9".to_string(),
            max_retries: 1,
            retry_delay: 0.1,
            ..Settings::default()
        };
        let manager = IndexManager::new(settings.clone()).unwrap();

        let project_key =
            validate_project_root(project_dir.path().to_str().unwrap()).unwrap();

        // Seed the registry with exactly the identities a pass would compute
        let blob = splitter::split_blobs("a.py", "x = 1\n", settings.max_lines_per_blob)
            .remove(0);
        let seeded: BTreeSet<String> = [blob.identity().to_string()].into_iter().collect();
        let registry = ProjectRegistry::new(settings.registry_path());
        registry.merge_and_save(&project_key, &seeded).await.unwrap();

        // The pass finds nothing new and returns the known set untouched
        let result = manager.index_project(&project_key).await.unwrap();
        assert_eq!(result, seeded);
    }

    #[tokio::test]
    async fn test_validation_precedes_token_check_for_query() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_with(&temp_dir, "your-token-here-please-configure");

        // Input validation fires before the token gate
        let err = manager.search_context("/somewhere", "").await.unwrap_err();
        assert_eq!(err.to_string(), "query is required");
    }
}

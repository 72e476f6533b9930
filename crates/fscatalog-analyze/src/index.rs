//! Building and persisting a directory's hash index.
//!
//! Every file under the directory is hashed exactly once per build with
//! the sampled identity hash (size plus leading bytes). Results are folded
//! into the mapping on the calling thread and written to the directory's
//! index file when the batch completes.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use fscatalog_core::{CatalogConfig, CatalogError, HashIndex};
use fscatalog_scan::DirectoryNode;

use crate::executor::ParallelExecutor;

/// Progress information while hashing.
#[derive(Debug, Clone, Default)]
pub struct HashProgress {
    /// Files hashed so far.
    pub files_hashed: u64,
    /// Files that could not be hashed.
    pub files_failed: u64,
    /// Total files to process.
    pub total_files: u64,
    /// Most recently hashed file.
    pub current_file: Option<PathBuf>,
    /// Time elapsed since hashing started.
    pub elapsed: Duration,
}

impl HashProgress {
    /// Fraction of files processed, from 0.0 to 1.0.
    pub fn ratio(&self) -> f64 {
        if self.total_files == 0 {
            1.0
        } else {
            (self.files_hashed + self.files_failed) as f64 / self.total_files as f64
        }
    }
}

/// Builds, reuses and persists directory hash indexes.
pub struct IndexBuilder {
    config: CatalogConfig,
    progress_tx: broadcast::Sender<HashProgress>,
}

impl IndexBuilder {
    /// Create a builder with default config.
    pub fn new() -> Self {
        Self::with_config(CatalogConfig::default())
    }

    /// Create a builder with custom config.
    pub fn with_config(config: CatalogConfig) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            config,
            progress_tx,
        }
    }

    /// Config used for chunk size and worker count.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Subscribe to hashing progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<HashProgress> {
        self.progress_tx.subscribe()
    }

    /// Return the directory's index, building it if needed.
    ///
    /// With `replace == false` an index already held by the directory (loaded
    /// from disk at construction or built earlier) is reused as long as it
    /// was sampled with the configured chunk size. With `replace == true`
    /// the persisted file is deleted, the directory is re-walked and every
    /// file is hashed again.
    pub fn build<'a>(
        &self,
        dir: &'a mut DirectoryNode,
        replace: bool,
    ) -> Result<&'a HashIndex, CatalogError> {
        self.config.validate()?;
        let chunk_size = self.config.chunk_size;

        let stored_chunk = dir.index().map(HashIndex::chunk_size);
        if !replace && stored_chunk == Some(chunk_size) {
            if let Some(existing) = dir.clear_index() {
                debug!(path = %dir.path().display(), "reusing existing index");
                return Ok(dir.set_index(existing));
            }
        }

        if let (false, Some(stored)) = (replace, stored_chunk) {
            info!(
                path = %dir.path().display(),
                stored,
                requested = chunk_size,
                "chunk size changed, rebuilding index"
            );
        }

        // The held index stays in place until a replacement exists.
        let index = self.rebuild(dir, replace)?;
        Ok(dir.set_index(index))
    }

    fn rebuild(&self, dir: &mut DirectoryNode, replace: bool) -> Result<HashIndex, CatalogError> {
        let executor = ParallelExecutor::new(self.config.threads)?;
        let index_path = dir.index_path();

        if replace {
            match HashIndex::remove(&index_path) {
                Ok(true) => debug!(path = %index_path.display(), "removed stale index"),
                Ok(false) => {}
                Err(e) => warn!(path = %index_path.display(), error = %e, "could not remove index"),
            }
            dir.refresh();
        }

        let index = self.hash_with(&executor, dir);

        if let Err(e) = index.save(&index_path) {
            warn!(path = %index_path.display(), error = %e, "could not persist index");
        }

        Ok(index)
    }

    /// Hash every file below `dir` into a fresh index without touching disk.
    pub fn hash_files(&self, dir: &DirectoryNode) -> Result<HashIndex, CatalogError> {
        let executor = ParallelExecutor::new(self.config.threads)?;
        Ok(self.hash_with(&executor, dir))
    }

    fn hash_with(&self, executor: &ParallelExecutor, dir: &DirectoryNode) -> HashIndex {
        let chunk_size = self.config.chunk_size;
        let interval = self.config.progress_interval.max(1);

        let files = dir.file_children();
        let start = Instant::now();
        let mut progress = HashProgress {
            total_files: files.len() as u64,
            ..HashProgress::default()
        };
        let mut index = HashIndex::new(chunk_size);

        info!(
            path = %dir.path().display(),
            files = files.len(),
            workers = executor.workers(),
            chunk_size,
            "hashing files"
        );

        let stats = executor.for_each(
            files,
            |file| {
                file.content_hash(chunk_size)
                    .map(|hash| (hash, file.path().to_path_buf()))
            },
            |(hash, path)| {
                progress.files_hashed += 1;
                if progress.files_hashed % interval == 0 {
                    progress.current_file = Some(path.clone());
                    progress.elapsed = start.elapsed();
                    let _ = self.progress_tx.send(progress.clone());
                }
                index.insert(hash, path);
            },
        );

        progress.files_failed = stats.failed as u64;
        progress.elapsed = start.elapsed();
        let _ = self.progress_tx.send(progress);

        info!(
            path = %dir.path().display(),
            hashed = stats.succeeded,
            failed = stats.failed,
            buckets = index.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "index built"
        );

        index
    }
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

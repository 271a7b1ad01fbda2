//! Isolated test environments with temporary storage and staging trees.

use crate::fixtures::create_patterned_file;
use common::{CacheConfig, CacheResult, ShardConfig};
use engine::CacheEngine;
use passthrough::PassthroughFs;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A test context holding a temporary storage root and staging directory.
///
/// Every context is independent; both trees are removed when the context is
/// dropped.
pub struct CacheContext {
    _temp_dir: TempDir,
    storage_dir: PathBuf,
    cache_dir: PathBuf,
}

impl CacheContext {
    pub fn new() -> CacheResult<Self> {
        let temp_dir = tempfile::tempdir()?;
        let storage_dir = temp_dir.path().join("storage");
        let cache_dir = temp_dir.path().join("cache");
        fs::create_dir(&storage_dir)?;
        fs::create_dir(&cache_dir)?;
        Ok(Self {
            _temp_dir: temp_dir,
            storage_dir,
            cache_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Build a config over this context's staging directory.
    pub fn config(&self, page_size: usize, caches: Vec<ShardConfig>) -> CacheConfig {
        CacheConfig::builder()
            .cache_dir(self.cache_dir.clone())
            .page_size(page_size)
            .caches(caches)
            .build()
    }

    /// Engine with one wildcard LRU shard of `pages` capacity and 4 KiB pages.
    pub fn single_shard_engine(&self, pages: usize) -> CacheResult<CacheEngine> {
        CacheEngine::new(CacheConfig::single_shard(&self.cache_dir, 4096, pages))
    }

    /// Engine with an arbitrary shard layout.
    pub fn engine(&self, config: CacheConfig) -> CacheResult<CacheEngine> {
        CacheEngine::new(config)
    }

    /// Filesystem layer rooted at this context's storage directory.
    pub fn passthrough(&self, config: CacheConfig) -> CacheResult<PassthroughFs> {
        PassthroughFs::new(&self.storage_dir, config)
    }

    /// Absolute backing path for a storage-relative name, creating parent
    /// directories as needed.
    pub fn storage_path(&self, relative: &str) -> PathBuf {
        let path = self.storage_dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create storage subdirectory");
        }
        path
    }

    /// Create a patterned backing file and return its absolute path.
    pub fn patterned_file(&self, relative: &str, size: usize) -> CacheResult<PathBuf> {
        let path = self.storage_path(relative);
        create_patterned_file(&path, size)?;
        Ok(path)
    }

    /// Number of page files currently in the staging directory.
    pub fn staging_file_count(&self) -> usize {
        fs::read_dir(&self.cache_dir).map(|dir| dir.count()).unwrap_or(0)
    }

    /// Names of the page files currently in the staging directory.
    pub fn staging_file_names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.cache_dir)
            .map(|dir| {
                dir.map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Assert that a shard's index and the staging directory agree.
///
/// With a single shard this is the index-equals-disk invariant; with several
/// shards, call once per shard after computing each shard's share.
pub fn assert_index_matches_staging(engine: &CacheEngine, ctx: &CacheContext) {
    let mut indexed: Vec<String> = (0..engine.shard_count())
        .flat_map(|shard| engine.resident_ids(shard))
        .map(|id| id.as_str().to_string())
        .collect();
    indexed.sort();
    assert_eq!(
        indexed,
        ctx.staging_file_names(),
        "eviction index and staging directory disagree"
    );
}

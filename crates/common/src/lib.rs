
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Index of a fixed-size page within a backing file.
/// Examples:
/// - `let first: PageIndex = 0;`
/// - `let tail: PageIndex = file_len / page_size as u64;`
pub type PageIndex = u64;

/// Stable identifier for one page of one backing file.
///
/// Formed as `hex(md5(path bytes)) + "_" + decimal(page_index)` and used both
/// as the key in the eviction index and as the page's filename in the staging
/// directory. The hex digest never contains `_`, so the page index can always
/// be recovered by splitting at the last delimiter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageId(String);

impl PageId {
    pub fn new(path: &Path, index: PageIndex) -> Self {
        let digest = md5::compute(path.as_os_str().as_encoded_bytes());
        PageId(format!("{digest:x}_{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the page index from the identifier's suffix.
    pub fn page_index(&self) -> CacheResult<PageIndex> {
        let (_, suffix) = self
            .0
            .rsplit_once('_')
            .ok_or_else(|| CacheError::Invariant(format!("malformed page id {}", self.0)))?;
        suffix
            .parse::<PageIndex>()
            .map_err(|_| CacheError::Invariant(format!("malformed page index in id {}", self.0)))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical error type shared across the cache subsystems.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("config: {0}")]
    Config(String),
    #[error("backing store: {0}")]
    Backing(String),
    #[error("staging store: {0}")]
    Staging(String),
    #[error("eviction: {0}")]
    Eviction(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `CacheError`.
pub type CacheResult<T> = Result<T, CacheError>;

/// Replacement policy selecting a shard's eviction victim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplacementPolicy {
    Lru,
    Lfu,
    Mru,
}

/// One cache shard: an independently sized eviction domain selected by a
/// path rule (`"*"` for the wildcard default, otherwise a substring match).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardConfig {
    pub replacement_policy: ReplacementPolicy,
    /// Capacity in pages, not bytes.
    pub size: usize,
    #[serde(default = "wildcard_rule")]
    pub dir: String,
}

fn wildcard_rule() -> String {
    "*".to_string()
}

impl ShardConfig {
    pub fn new(replacement_policy: ReplacementPolicy, size: usize, dir: impl Into<String>) -> Self {
        Self {
            replacement_policy,
            size,
            dir: dir.into(),
        }
    }
}

/// Runtime configuration for one cache engine instance.
///
/// # Example
/// ```
/// use common::{CacheConfig, ReplacementPolicy, ShardConfig};
/// use std::path::PathBuf;
///
/// let config = CacheConfig::builder()
///     .cache_dir(PathBuf::from("/tmp/staging"))
///     .page_size(4096)
///     .caches(vec![ShardConfig::new(ReplacementPolicy::Lru, 256, "*")])
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct CacheConfig {
    /// Staging directory where resident pages live, one file per page.
    pub cache_dir: PathBuf,
    /// Fixed page width in bytes; immutable for the life of the instance.
    pub page_size: usize,
    /// Backing paths containing any of these substrings bypass the cache.
    #[serde(default)]
    #[builder(default)]
    pub ignore_dir: Vec<String>,
    /// Shards in declaration order; order is significant for routing.
    pub caches: Vec<ShardConfig>,
}

impl CacheConfig {
    /// Load and validate a JSON config document.
    pub fn from_file(path: impl AsRef<Path>) -> CacheResult<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|e| CacheError::Config(format!("failed to read config file: {e}")))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| CacheError::Config(format!("failed to parse config file: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// The default layout: a single wildcard LRU shard.
    pub fn single_shard(cache_dir: impl Into<PathBuf>, page_size: usize, pages: usize) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            page_size,
            ignore_dir: Vec::new(),
            caches: vec![ShardConfig::new(ReplacementPolicy::Lru, pages, "*")],
        }
    }

    pub fn validate(&self) -> CacheResult<()> {
        if self.page_size == 0 {
            return Err(CacheError::Config("page_size must be positive".into()));
        }
        if !self.cache_dir.is_absolute() {
            return Err(CacheError::Config(format!(
                "cache_dir must be an absolute path, got {}",
                self.cache_dir.display()
            )));
        }
        if self.caches.is_empty() {
            return Err(CacheError::Config(
                "at least one cache shard is required".into(),
            ));
        }
        for (idx, shard) in self.caches.iter().enumerate() {
            if shard.size == 0 {
                return Err(CacheError::Config(format!(
                    "cache shard {idx} has zero capacity"
                )));
            }
        }
        Ok(())
    }
}

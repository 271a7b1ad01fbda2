//! Filesystem layer over the cache engine.
//!
//! Resolves mount-relative paths to absolute backing paths under a storage
//! root, owns the open backing file handles, and forwards the data-path
//! operations (read, write, truncate, flush) to the engine. Metadata
//! operations and the mount driver itself live outside this crate; callers
//! map [`common::CacheError`] values to their transport's error codes.

#[cfg(test)]
mod tests;

use common::{CacheConfig, CacheError, CacheResult};
use engine::CacheEngine;
use hashbrown::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Pass-through filesystem state: one engine, one storage root, and the
/// table of open backing handles keyed by the numeric handle returned from
/// `open`/`create`.
pub struct PassthroughFs {
    root: PathBuf,
    engine: CacheEngine,
    handles: HashMap<u64, File>,
    next_fh: u64,
}

impl std::fmt::Debug for PassthroughFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassthroughFs")
            .field("root", &self.root)
            .field("next_fh", &self.next_fh)
            .finish()
    }
}

impl PassthroughFs {
    pub fn new(root: impl Into<PathBuf>, config: CacheConfig) -> CacheResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CacheError::Config(format!(
                "storage root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root,
            engine: CacheEngine::new(config)?,
            handles: HashMap::new(),
            next_fh: 1,
        })
    }

    pub fn engine(&self) -> &CacheEngine {
        &self.engine
    }

    /// Resolve a mount-relative path to its backing path under the root.
    pub fn full_path(&self, partial: &Path) -> PathBuf {
        let partial = partial.strip_prefix("/").unwrap_or(partial);
        self.root.join(partial)
    }

    /// Open an existing backing file read-write and register a handle.
    pub fn open(&mut self, path: &Path) -> CacheResult<u64> {
        let full = self.full_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&full)
            .map_err(|e| CacheError::Backing(format!("failed to open {}: {e}", full.display())))?;
        Ok(self.register(file))
    }

    /// Create (or open) a backing file read-write and register a handle.
    pub fn create(&mut self, path: &Path) -> CacheResult<u64> {
        let full = self.full_path(path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&full)
            .map_err(|e| CacheError::Backing(format!("failed to create {}: {e}", full.display())))?;
        Ok(self.register(file))
    }

    pub fn read(&mut self, path: &Path, length: usize, offset: u64, fh: u64) -> CacheResult<Vec<u8>> {
        let full = self.full_path(path);
        let file = self
            .handles
            .get_mut(&fh)
            .ok_or_else(|| CacheError::Backing(format!("unknown file handle {fh}")))?;
        self.engine.read(&full, length, offset, file)
    }

    pub fn write(&mut self, path: &Path, buf: &[u8], offset: u64, fh: u64) -> CacheResult<usize> {
        let full = self.full_path(path);
        let file = self
            .handles
            .get_mut(&fh)
            .ok_or_else(|| CacheError::Backing(format!("unknown file handle {fh}")))?;
        self.engine.write(&full, buf, offset, file)
    }

    pub fn truncate(&mut self, path: &Path, length: u64) -> CacheResult<()> {
        let full = self.full_path(path);
        self.engine.truncate(&full, length)
    }

    pub fn flush(&mut self, path: &Path, fh: u64) -> CacheResult<()> {
        let full = self.full_path(path);
        let file = self
            .handles
            .get_mut(&fh)
            .ok_or_else(|| CacheError::Backing(format!("unknown file handle {fh}")))?;
        self.engine.flush(&full, file)
    }

    /// Durability barrier; same contract as `flush`.
    pub fn fsync(&mut self, path: &Path, fh: u64) -> CacheResult<()> {
        self.flush(path, fh)
    }

    /// Drop a handle, closing the backing file.
    pub fn release(&mut self, fh: u64) -> CacheResult<()> {
        self.handles
            .remove(&fh)
            .map(|_| ())
            .ok_or_else(|| CacheError::Backing(format!("unknown file handle {fh}")))
    }

    fn register(&mut self, file: File) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        self.handles.insert(fh, file);
        fh
    }
}

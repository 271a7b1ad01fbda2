//! Page cache engine for the pass-through filesystem.
//!
//! The engine sits between the filesystem layer and the backing directory
//! tree, providing:
//! - Rule-based routing of backing paths to independently sized shards
//! - Page-granular miss fill, write-back, and LRU/LFU/MRU eviction
//! - A staging directory kept coherent with the in-memory index
//!
//! Backing file handles are owned by the caller; the engine restores their
//! position to `offset + length` before returning from read and write. The
//! engine itself is a plain value operated through `&mut self`: within one
//! instance, operations are serialised by the owner.
//!
//! # Example
//!
//! ```no_run
//! use common::CacheConfig;
//! use engine::CacheEngine;
//! use std::fs::OpenOptions;
//! use std::path::Path;
//!
//! let config = CacheConfig::single_shard("/fast/staging", 4096, 256);
//! let mut engine = CacheEngine::new(config).unwrap();
//!
//! let path = Path::new("/slow/storage/data.bin");
//! let mut fh = OpenOptions::new().read(true).write(true).open(path).unwrap();
//! let bytes = engine.read(path, 1024, 0, &mut fh).unwrap();
//! assert_eq!(bytes.len(), 1024);
//! ```

mod plan;

pub use eviction::CacheEntry;
pub use plan::{PageOp, affected_pages};

use common::{CacheConfig, CacheError, CacheResult, PageId};
use eviction::{EvictionIndex, build_index};
use router::{Route, Router};
use staging::StagingStore;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Multi-shard write-back page cache.
///
/// Shards are addressed by their position in the configured declaration
/// order; the router decides which shard (if any) serves a path, and each
/// shard's eviction index shares no state with its neighbors.
pub struct CacheEngine {
    page_size: usize,
    staging: StagingStore,
    router: Router,
    shards: Vec<Box<dyn EvictionIndex>>,
}

impl CacheEngine {
    /// Build an engine from a validated configuration.
    pub fn new(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        let staging = StagingStore::open(&config.cache_dir, config.page_size)?;
        let router = Router::from_config(&config);
        let shards = config
            .caches
            .iter()
            .map(|shard| build_index(shard.replacement_policy, shard.size))
            .collect();
        Ok(Self {
            page_size: config.page_size,
            staging,
            router,
            shards,
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn staging_dir(&self) -> &Path {
        self.staging.dir()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Number of pages resident in one shard.
    pub fn shard_len(&self, shard: usize) -> usize {
        self.shards[shard].len()
    }

    /// Snapshot of the pages resident in one shard.
    pub fn resident_ids(&self, shard: usize) -> Vec<PageId> {
        self.shards[shard].ids()
    }

    /// Entry metadata for a resident page, if any.
    pub fn resident_entry(&self, shard: usize, id: &PageId) -> Option<&CacheEntry> {
        self.shards[shard].entry(id)
    }

    /// Read `length` bytes at `offset`, serving matched paths through the
    /// cache and everything else directly from the backing handle.
    pub fn read(
        &mut self,
        path: &Path,
        length: usize,
        offset: u64,
        fh: &mut File,
    ) -> CacheResult<Vec<u8>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let shard = match self.router.route(path) {
            Route::Bypass => return read_direct(fh, length, offset),
            Route::Shard(idx) => idx,
        };

        let mut out = Vec::with_capacity(length);
        for op in affected_pages(offset, length, self.page_size) {
            let id = PageId::new(path, op.index);
            let page = if self.shards[shard].contains(&id) {
                if !self.staging.exists(&id) {
                    return Err(CacheError::Invariant(format!(
                        "page {id} resident in index but missing from staging"
                    )));
                }
                self.shards[shard].touch(&id);
                self.staging.get(&id)?
            } else {
                self.admit_from_handle(shard, &id, path, &op, fh)?
            };
            out.extend_from_slice(&page[op.slice.clone()]);
        }

        fh.seek(SeekFrom::Start(offset + length as u64))
            .map_err(|e| CacheError::Backing(format!("failed to restore handle position: {e}")))?;
        Ok(out)
    }

    /// Write `buf` at `offset`, dirtying cached pages for matched paths and
    /// writing through for everything else. Returns the bytes written.
    pub fn write(
        &mut self,
        path: &Path,
        buf: &[u8],
        offset: u64,
        fh: &mut File,
    ) -> CacheResult<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let shard = match self.router.route(path) {
            Route::Bypass => return write_direct(fh, buf, offset),
            Route::Shard(idx) => idx,
        };

        let mut cursor = 0usize;
        let mut written = 0usize;
        for op in affected_pages(offset, buf.len(), self.page_size) {
            let id = PageId::new(path, op.index);
            let chunk = &buf[cursor..cursor + op.slice.len()];

            if self.shards[shard].contains(&id) {
                if !self.staging.exists(&id) {
                    return Err(CacheError::Invariant(format!(
                        "page {id} resident in index but missing from staging"
                    )));
                }
                self.shards[shard].touch(&id);
                self.shards[shard].set_dirty(&id);
                self.staging.patch(&id, op.slice.start, chunk)?;
            } else {
                if self.shards[shard].len() == self.shards[shard].capacity() {
                    self.evict_one(shard)?;
                }
                if op.covers_page(self.page_size) {
                    self.staging.put(&id, chunk)?;
                } else {
                    // partial page: fetch the stale page first, then patch it
                    let stale = self.fetch_file_page(path, op.start)?;
                    self.staging.put(&id, &stale)?;
                    if let Err(e) = self.staging.patch(&id, op.slice.start, chunk) {
                        let _ = self.staging.remove(&id);
                        return Err(e);
                    }
                }
                self.shards[shard]
                    .insert(id.clone(), CacheEntry::new(path, op.index, true));
            }

            cursor += op.slice.len();
            written += op.slice.len();
        }

        fh.seek(SeekFrom::Start(offset + buf.len() as u64))
            .map_err(|e| CacheError::Backing(format!("failed to restore handle position: {e}")))?;
        Ok(written)
    }

    /// Truncate the backing file to `length` and invalidate every resident
    /// page at or beyond the new end.
    ///
    /// A dirty page straddling `length` first writes back its surviving
    /// prefix; pages wholly beyond the new end are dropped without writeback
    /// since none of their bytes survive.
    pub fn truncate(&mut self, path: &Path, length: u64) -> CacheResult<()> {
        let page_size = self.page_size as u64;
        let drop_from = length.div_ceil(page_size);

        for shard in 0..self.shards.len() {
            for id in self.shards[shard].ids() {
                let Some((page_index, dirty)) = self.shards[shard]
                    .entry(&id)
                    .filter(|entry| entry.path.as_path() == path)
                    .map(|entry| (entry.page_index, entry.dirty))
                else {
                    continue;
                };
                let page_start = page_index * page_size;
                if !dirty || page_index >= drop_from || page_start + page_size <= length {
                    continue;
                }
                let keep = (length - page_start) as usize;
                let page = self.staging.get(&id)?;
                let mut file = OpenOptions::new().write(true).open(path).map_err(|e| {
                    CacheError::Backing(format!(
                        "failed to open {} for writeback: {e}",
                        path.display()
                    ))
                })?;
                file.seek(SeekFrom::Start(page_start))
                    .map_err(|e| CacheError::Backing(format!("failed to seek: {e}")))?;
                file.write_all(&page[..keep])
                    .map_err(|e| CacheError::Backing(format!("failed to write back: {e}")))?;
                self.shards[shard].clear_dirty(&id);
            }
        }

        let file = OpenOptions::new().write(true).open(path).map_err(|e| {
            CacheError::Backing(format!("failed to open {} for truncate: {e}", path.display()))
        })?;
        file.set_len(length)
            .map_err(|e| CacheError::Backing(format!("failed to truncate: {e}")))?;

        for shard in 0..self.shards.len() {
            let doomed: Vec<PageId> = self.shards[shard]
                .ids()
                .into_iter()
                .filter(|id| {
                    self.shards[shard]
                        .entry(id)
                        .is_some_and(|entry| {
                            entry.path.as_path() == path && entry.page_index >= drop_from
                        })
                })
                .collect();
            for id in doomed {
                let Some(entry) = self.shards[shard].remove(&id) else {
                    continue;
                };
                if let Err(e) = self.staging.remove(&id) {
                    self.shards[shard].insert(id, entry);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Write back every dirty page of `path`, clear the dirty flags, and
    /// fsync the backing handle. Residency and recency are preserved, so a
    /// second flush is a no-op.
    pub fn flush(&mut self, path: &Path, fh: &mut File) -> CacheResult<()> {
        for shard in 0..self.shards.len() {
            for id in self.shards[shard].ids() {
                let Some(entry) = self.shards[shard]
                    .entry(&id)
                    .filter(|entry| entry.path.as_path() == path && entry.dirty)
                    .cloned()
                else {
                    continue;
                };
                self.write_back(&id, &entry)?;
                self.shards[shard].clear_dirty(&id);
            }
        }
        fh.sync_all()
            .map_err(|e| CacheError::Backing(format!("fsync failed: {e}")))?;
        Ok(())
    }

    /// Miss path for reads: evict if full, fill the page from the caller's
    /// handle, persist it, and insert a clean entry.
    fn admit_from_handle(
        &mut self,
        shard: usize,
        id: &PageId,
        path: &Path,
        op: &PageOp,
        fh: &mut File,
    ) -> CacheResult<Vec<u8>> {
        if self.shards[shard].len() == self.shards[shard].capacity() {
            self.evict_one(shard)?;
        }
        fh.seek(SeekFrom::Start(op.start))
            .map_err(|e| CacheError::Backing(format!("failed to seek to page: {e}")))?;
        let page = read_zero_padded(fh, self.page_size)
            .map_err(|e| CacheError::Backing(format!("failed to read page: {e}")))?;
        self.staging.put(id, &page)?;
        self.shards[shard]
            .insert(id.clone(), CacheEntry::new(path, op.index, false));
        Ok(page)
    }

    /// Fetch a page through a fresh read-only handle; used when filling a
    /// partially written page, where the caller's handle may not be readable.
    fn fetch_file_page(&self, path: &Path, start: u64) -> CacheResult<Vec<u8>> {
        let mut file = File::open(path).map_err(|e| {
            CacheError::Backing(format!("failed to open {}: {e}", path.display()))
        })?;
        file.seek(SeekFrom::Start(start))
            .map_err(|e| CacheError::Backing(format!("failed to seek to page: {e}")))?;
        read_zero_padded(&mut file, self.page_size)
            .map_err(|e| CacheError::Backing(format!("failed to read page: {e}")))
    }

    /// Evict one page from a shard, writing it back first if dirty.
    ///
    /// On writeback failure the victim is re-inserted at the MRU end, still
    /// dirty, and the triggering operation fails; the staging file is only
    /// removed after the page's bytes are safe in the backing file.
    fn evict_one(&mut self, shard: usize) -> CacheResult<()> {
        let (id, entry) = self.shards[shard]
            .evict()
            .ok_or_else(|| CacheError::Invariant("eviction from an empty shard".into()))?;
        if entry.dirty {
            if let Err(e) = self.write_back(&id, &entry) {
                self.shards[shard].insert(id, entry);
                return Err(CacheError::Eviction(format!("dirty writeback failed: {e}")));
            }
        }
        if let Err(e) = self.staging.remove(&id) {
            let mut entry = entry;
            entry.dirty = false;
            self.shards[shard].insert(id, entry);
            return Err(e);
        }
        Ok(())
    }

    /// Copy a page's staged bytes to its backing file at the page-aligned
    /// offset. The full page is written: a dirty page may extend the file,
    /// and those bytes exist nowhere but staging until this point.
    fn write_back(&self, id: &PageId, entry: &CacheEntry) -> CacheResult<()> {
        let page = self.staging.get(id)?;
        let mut file = OpenOptions::new().write(true).open(&entry.path).map_err(|e| {
            CacheError::Backing(format!(
                "failed to open {} for writeback: {e}",
                entry.path.display()
            ))
        })?;
        file.seek(SeekFrom::Start(entry.page_index * self.page_size as u64))
            .map_err(|e| CacheError::Backing(format!("failed to seek to page: {e}")))?;
        file.write_all(&page)
            .map_err(|e| CacheError::Backing(format!("failed to write back page {id}: {e}")))?;
        Ok(())
    }
}

/// Read up to `page_size` bytes at the current position, zero-padding past
/// EOF so staging files are always exactly one page long.
fn read_zero_padded(src: &mut impl Read, page_size: usize) -> std::io::Result<Vec<u8>> {
    let mut page = vec![0u8; page_size];
    let mut filled = 0;
    while filled < page_size {
        let n = src.read(&mut page[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(page)
}

fn read_direct(fh: &mut File, length: usize, offset: u64) -> CacheResult<Vec<u8>> {
    fh.seek(SeekFrom::Start(offset))
        .map_err(|e| CacheError::Backing(format!("failed to seek: {e}")))?;
    let mut buf = vec![0u8; length];
    let mut filled = 0;
    while filled < length {
        let n = fh
            .read(&mut buf[filled..])
            .map_err(|e| CacheError::Backing(format!("failed to read: {e}")))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

fn write_direct(fh: &mut File, buf: &[u8], offset: u64) -> CacheResult<usize> {
    fh.seek(SeekFrom::Start(offset))
        .map_err(|e| CacheError::Backing(format!("failed to seek: {e}")))?;
    fh.write_all(buf)
        .map_err(|e| CacheError::Backing(format!("failed to write: {e}")))?;
    Ok(buf.len())
}

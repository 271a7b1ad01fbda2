use common::{CacheError, CacheResult, PageId};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};


/// File-backed page store under a dedicated staging directory.
///
/// One regular file per resident page, named by `PageId`; every file is
/// exactly `page_size` bytes. The store does not interpret its contents and
/// keeps no metadata of its own; residency and dirtiness live in the
/// eviction index.
#[derive(Debug)]
pub struct StagingStore {
    dir: PathBuf,
    page_size: usize,
}

impl StagingStore {
    /// Open the store, creating the staging directory if it does not exist.
    pub fn open(dir: impl Into<PathBuf>, page_size: usize) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            CacheError::Staging(format!(
                "failed to create staging directory {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self { dir, page_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Staging file path for a page.
    pub fn page_path(&self, id: &PageId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    pub fn exists(&self, id: &PageId) -> bool {
        self.page_path(id).is_file()
    }

    /// Create or overwrite a page file with exactly `page_size` bytes.
    ///
    /// A failed or partial write unlinks the file before the error returns,
    /// so a put either fully succeeds or leaves no staging file behind.
    pub fn put(&self, id: &PageId, bytes: &[u8]) -> CacheResult<()> {
        if bytes.len() != self.page_size {
            return Err(CacheError::Staging(format!(
                "page {id} has length {}, expected {}",
                bytes.len(),
                self.page_size
            )));
        }
        let path = self.page_path(id);
        if let Err(e) = fs::write(&path, bytes) {
            let _ = fs::remove_file(&path);
            return Err(CacheError::Staging(format!("failed to write page {id}: {e}")));
        }
        Ok(())
    }

    /// Overwrite a sub-range of an existing page file.
    pub fn patch(&self, id: &PageId, offset: usize, bytes: &[u8]) -> CacheResult<()> {
        if offset + bytes.len() > self.page_size {
            return Err(CacheError::Staging(format!(
                "patch of page {id} out of bounds: offset {offset} + {} > {}",
                bytes.len(),
                self.page_size
            )));
        }
        let path = self.page_path(id);
        let mut file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| CacheError::Staging(format!("failed to open page {id}: {e}")))?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|e| CacheError::Staging(format!("failed to seek in page {id}: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| CacheError::Staging(format!("failed to patch page {id}: {e}")))?;
        Ok(())
    }

    /// Read the full page.
    pub fn get(&self, id: &PageId) -> CacheResult<Vec<u8>> {
        let path = self.page_path(id);
        let mut file = fs::File::open(&path)
            .map_err(|e| CacheError::Staging(format!("failed to open page {id}: {e}")))?;
        let mut page = vec![0u8; self.page_size];
        file.read_exact(&mut page)
            .map_err(|e| CacheError::Staging(format!("failed to read page {id}: {e}")))?;
        Ok(page)
    }

    /// Unlink a page file.
    pub fn remove(&self, id: &PageId) -> CacheResult<()> {
        fs::remove_file(self.page_path(id))
            .map_err(|e| CacheError::Staging(format!("failed to remove page {id}: {e}")))
    }
}

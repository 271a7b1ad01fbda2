//! Backing-file fixtures and the byte oracle used to check reads.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// 32-character alphabet the patterned files cycle through.
const PATTERN: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyzABCDEF";

/// The bytes a patterned file holds at `[offset, offset + len)`.
///
/// Use as the expected value for any read against a file built by
/// [`create_patterned_file`], at any offset and length.
pub fn pattern_at(offset: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| PATTERN[((offset + i as u64) % PATTERN.len() as u64) as usize])
        .collect()
}

/// Create a file of `size` bytes cycling through the pattern alphabet.
pub fn create_patterned_file(path: &Path, size: usize) -> io::Result<()> {
    let mut file = File::create(path)?;
    let mut remaining = size;
    let chunk = pattern_at(0, PATTERN.len() * 128);
    while remaining > 0 {
        let take = remaining.min(chunk.len());
        // the chunk length is a multiple of the alphabet, so every chunk
        // starts at pattern position zero
        file.write_all(&chunk[..take])?;
        remaining -= take;
    }
    Ok(())
}

/// Open a backing file the way the filesystem layer does: read-write.
pub fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pattern_oracle_matches_file_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data");
        create_patterned_file(&path, 10_000).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 10_000);
        assert_eq!(&bytes[0..5], b"abcde");
        assert_eq!(bytes, pattern_at(0, 10_000));
        assert_eq!(&bytes[4095..4098], &pattern_at(4095, 3)[..]);
    }
}

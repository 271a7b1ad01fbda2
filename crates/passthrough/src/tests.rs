use super::*;
use common::CacheConfig;
use std::fs;
use tempfile::tempdir;

const PAGE_SIZE: usize = 4096;

fn setup() -> (tempfile::TempDir, PassthroughFs) {
    let tmp = tempdir().unwrap();
    let storage = tmp.path().join("storage");
    let cache = tmp.path().join("cache");
    fs::create_dir(&storage).unwrap();
    let fs_layer =
        PassthroughFs::new(&storage, CacheConfig::single_shard(&cache, PAGE_SIZE, 4)).unwrap();
    (tmp, fs_layer)
}

#[test]
fn full_path_strips_the_leading_separator() {
    let (tmp, fs_layer) = setup();
    assert_eq!(
        fs_layer.full_path(Path::new("/dir/file")),
        tmp.path().join("storage").join("dir/file")
    );
    assert_eq!(
        fs_layer.full_path(Path::new("dir/file")),
        tmp.path().join("storage").join("dir/file")
    );
}

#[test]
fn new_rejects_a_missing_storage_root() {
    let tmp = tempdir().unwrap();
    let err = PassthroughFs::new(
        tmp.path().join("nope"),
        CacheConfig::single_shard(tmp.path().join("cache"), PAGE_SIZE, 4),
    )
    .unwrap_err();
    assert!(matches!(err, CacheError::Config(_)));
}

#[test]
fn create_write_read_round_trips_through_the_cache() {
    let (_tmp, mut fs_layer) = setup();

    let fh = fs_layer.create(Path::new("/data.bin")).unwrap();
    let written = fs_layer.write(Path::new("/data.bin"), b"hello cache", 0, fh).unwrap();
    assert_eq!(written, 11);

    let bytes = fs_layer.read(Path::new("/data.bin"), 11, 0, fh).unwrap();
    assert_eq!(bytes, b"hello cache");

    // the write is staged, not yet in the backing file
    assert_eq!(fs_layer.engine().shard_len(0), 1);
}

#[test]
fn flush_persists_to_the_backing_file() {
    let (tmp, mut fs_layer) = setup();

    let fh = fs_layer.create(Path::new("/data.bin")).unwrap();
    fs_layer.write(Path::new("/data.bin"), b"durable", 0, fh).unwrap();
    fs_layer.flush(Path::new("/data.bin"), fh).unwrap();

    let backing = fs::read(tmp.path().join("storage/data.bin")).unwrap();
    assert_eq!(&backing[..7], b"durable");
}

#[test]
fn fsync_behaves_like_flush() {
    let (tmp, mut fs_layer) = setup();

    let fh = fs_layer.create(Path::new("/data.bin")).unwrap();
    fs_layer.write(Path::new("/data.bin"), b"synced", 0, fh).unwrap();
    fs_layer.fsync(Path::new("/data.bin"), fh).unwrap();

    let backing = fs::read(tmp.path().join("storage/data.bin")).unwrap();
    assert_eq!(&backing[..6], b"synced");
}

#[test]
fn open_requires_an_existing_file() {
    let (_tmp, mut fs_layer) = setup();
    assert!(fs_layer.open(Path::new("/missing")).is_err());

    let fh = fs_layer.create(Path::new("/present")).unwrap();
    fs_layer.release(fh).unwrap();
    assert!(fs_layer.open(Path::new("/present")).is_ok());
}

#[test]
fn truncate_shrinks_the_backing_file() {
    let (tmp, mut fs_layer) = setup();

    let fh = fs_layer.create(Path::new("/data.bin")).unwrap();
    fs_layer
        .write(Path::new("/data.bin"), &vec![7u8; PAGE_SIZE], 0, fh)
        .unwrap();
    fs_layer.flush(Path::new("/data.bin"), fh).unwrap();

    fs_layer.truncate(Path::new("/data.bin"), 100).unwrap();
    let meta = fs::metadata(tmp.path().join("storage/data.bin")).unwrap();
    assert_eq!(meta.len(), 100);
}

#[test]
fn release_invalidates_the_handle() {
    let (_tmp, mut fs_layer) = setup();

    let fh = fs_layer.create(Path::new("/data.bin")).unwrap();
    fs_layer.release(fh).unwrap();

    assert!(fs_layer.read(Path::new("/data.bin"), 1, 0, fh).is_err());
    assert!(fs_layer.release(fh).is_err());
}

#[test]
fn handles_are_unique_per_open() {
    let (_tmp, mut fs_layer) = setup();
    let fh1 = fs_layer.create(Path::new("/a")).unwrap();
    let fh2 = fs_layer.create(Path::new("/b")).unwrap();
    assert_ne!(fh1, fh2);
}

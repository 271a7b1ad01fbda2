//! End-to-end scenarios exercising the cache engine over real directories.

use common::{CacheConfig, PageId, ReplacementPolicy, ShardConfig};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use testsupport::prelude::*;

const PAGE_SIZE: usize = 4096;
const MB: usize = 1024 * 1024;

#[test]
fn wildcard_shard_fills_and_evicts_under_lru() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f1", MB).unwrap();
    let mut engine = ctx.single_shard_engine(2).unwrap();
    let mut fh = open_rw(&path).unwrap();

    let bytes = engine.read(&path, 10, 0, &mut fh).unwrap();
    assert_eq!(bytes, pattern_at(0, 10));
    assert_eq!(ctx.staging_file_count(), 1);

    // spans past page 1; page 0 is evicted under LRU once the shard fills
    let bytes = engine.read(&path, 8192, 4098, &mut fh).unwrap();
    assert_eq!(bytes, pattern_at(4098, 8192));
    assert_eq!(ctx.staging_file_count(), 2);
    assert!(
        !ctx.staging_file_names()
            .contains(&PageId::new(&path, 0).as_str().to_string())
    );
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn shards_are_independent_eviction_domains() {
    let ctx = CacheContext::new().unwrap();
    let dir1_file = ctx.patterned_file("dir1/file1", MB).unwrap();
    let dir2_file = ctx.patterned_file("dir2/file1", MB).unwrap();
    let dir3_file = ctx.patterned_file("dir3/file1", MB).unwrap();

    let config = ctx.config(
        PAGE_SIZE,
        vec![
            ShardConfig::new(ReplacementPolicy::Lru, 1, "dir1"),
            ShardConfig::new(ReplacementPolicy::Lru, 1, "dir2"),
        ],
    );
    let mut engine = ctx.engine(config).unwrap();

    // dir1's shard holds one page no matter how many are read
    let mut fh = open_rw(&dir1_file).unwrap();
    engine.read(&dir1_file, 10, 0, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 1);
    engine.read(&dir1_file, 8192, 4098, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 1);

    // no rule matches dir3 and there is no wildcard
    let mut fh = open_rw(&dir3_file).unwrap();
    engine.read(&dir3_file, 10, 0, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 1);

    // dir2's shard adds its own page and stays at one
    let mut fh = open_rw(&dir2_file).unwrap();
    engine.read(&dir2_file, 10, 0, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 2);
    engine.read(&dir2_file, 10_000, 4098, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 2);

    assert_eq!(engine.shard_len(0), 1);
    assert_eq!(engine.shard_len(1), 1);
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn ignored_paths_never_populate_the_cache() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("ignore/ignore_file", MB).unwrap();

    let mut config = CacheConfig::single_shard(ctx.cache_dir(), PAGE_SIZE, 2);
    config.ignore_dir = vec!["ignore".to_string()];
    let mut engine = ctx.engine(config).unwrap();
    let mut fh = open_rw(&path).unwrap();

    let bytes = engine.read(&path, 10, 0, &mut fh).unwrap();
    assert_eq!(bytes, pattern_at(0, 10));
    assert_eq!(ctx.staging_file_count(), 0);

    let payload = b"string-inserting";
    let written = engine.write(&path, payload, 4095, &mut fh).unwrap();
    assert_eq!(written, payload.len());
    assert_eq!(ctx.staging_file_count(), 0);

    // the bypassed write is immediately visible to a bypassed read
    let bytes = engine.read(&path, payload.len(), 4095, &mut fh).unwrap();
    assert_eq!(bytes, payload);
    assert_eq!(ctx.staging_file_count(), 0);
}

#[test]
fn dirty_eviction_writes_the_old_page_into_the_backing_file() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", 2 * MB).unwrap();
    let mut engine = ctx.single_shard_engine(2).unwrap();
    let mut fh = open_rw(&path).unwrap();

    let payload = b"string-inserting";
    let written = engine.write(&path, payload, 4095, &mut fh).unwrap();
    assert_eq!(written, payload.len());
    assert_eq!(ctx.staging_file_count(), 2);

    // page 2 forces out dirty page 0, which must be written back first
    let written = engine.write(&path, payload, 8192, &mut fh).unwrap();
    assert_eq!(written, payload.len());
    assert_eq!(ctx.staging_file_count(), 2);

    let backing = fs::read(&path).unwrap();
    assert_eq!(backing[4095], b's');
    assert_eq!(&backing[..10], &pattern_at(0, 10)[..]);
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn write_flush_direct_read_round_trips() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", MB).unwrap();
    let mut engine = ctx.single_shard_engine(4).unwrap();
    let mut fh = open_rw(&path).unwrap();

    let payload = b"string-inserting";
    engine.write(&path, payload, 0, &mut fh).unwrap();
    engine.flush(&path, &mut fh).unwrap();

    let backing = fs::read(&path).unwrap();
    assert_eq!(&backing[..payload.len()], payload);

    let id = PageId::new(&path, 0);
    assert!(!engine.resident_entry(0, &id).unwrap().dirty);

    // flushing again changes nothing
    engine.flush(&path, &mut fh).unwrap();
    assert_eq!(&fs::read(&path).unwrap()[..payload.len()], payload);
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn truncate_into_a_dirty_page_keeps_the_prefix() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", 2 * PAGE_SIZE).unwrap();
    let mut engine = ctx.single_shard_engine(4).unwrap();
    let mut fh = open_rw(&path).unwrap();

    let payload = b"string-inserting";
    engine.write(&path, payload, 4, &mut fh).unwrap();
    engine.read(&path, 16, PAGE_SIZE as u64, &mut fh).unwrap();
    assert_eq!(ctx.staging_file_count(), 2);

    engine.truncate(&path, 64).unwrap();

    let backing = fs::read(&path).unwrap();
    assert_eq!(backing.len(), 64);
    assert_eq!(&backing[..4], &pattern_at(0, 4)[..]);
    assert_eq!(&backing[4..20], payload);

    // everything at or past page 1 is gone; page 0 stays, now clean
    assert_eq!(engine.shard_len(0), 1);
    assert!(
        !engine
            .resident_entry(0, &PageId::new(&path, 0))
            .unwrap()
            .dirty
    );
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn cached_reads_agree_with_direct_reads() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", MB).unwrap();
    let mut engine = ctx.single_shard_engine(3).unwrap();
    let mut fh = open_rw(&path).unwrap();

    // mix of shapes: single page, page-spanning, aligned, EOF-adjacent
    let requests: &[(u64, usize)] = &[
        (0, 10),
        (4090, 16),
        (4095, 4098),
        (8192, PAGE_SIZE),
        (MB as u64 - 100, 100),
        (13, 1),
    ];
    for &(offset, length) in requests {
        let bytes = engine.read(&path, length, offset, &mut fh).unwrap();
        assert_eq!(bytes, pattern_at(offset, length), "read at {offset}+{length}");
    }
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn program_order_writes_read_back_in_order() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", MB).unwrap();
    let mut engine = ctx.single_shard_engine(8).unwrap();
    let mut fh = open_rw(&path).unwrap();

    engine.write(&path, b"first", 100, &mut fh).unwrap();
    engine.write(&path, b"second", 102, &mut fh).unwrap();

    let bytes = engine.read(&path, 8, 100, &mut fh).unwrap();
    assert_eq!(bytes, b"fisecond");
}

#[test]
fn capacity_is_never_exceeded() {
    let ctx = CacheContext::new().unwrap();
    let path = ctx.patterned_file("f", MB).unwrap();
    let mut engine = ctx.single_shard_engine(3).unwrap();
    let mut fh = open_rw(&path).unwrap();

    for step in 0..40u64 {
        let offset = (step * 2731) % (MB as u64 - 64);
        if step % 3 == 0 {
            engine.write(&path, b"mutation", offset, &mut fh).unwrap();
        } else {
            engine.read(&path, 64, offset, &mut fh).unwrap();
        }
        assert!(engine.shard_len(0) <= 3);
        assert!(ctx.staging_file_count() <= 3);
    }
    engine.flush(&path, &mut fh).unwrap();
    assert_index_matches_staging(&engine, &ctx);
}

#[test]
fn passthrough_layer_drives_the_engine_end_to_end() {
    let ctx = CacheContext::new().unwrap();
    ctx.patterned_file("dir1/data", 3 * PAGE_SIZE).unwrap();

    let config = ctx.config(
        PAGE_SIZE,
        vec![ShardConfig::new(ReplacementPolicy::Lru, 4, "dir1")],
    );
    let mut fs_layer = ctx.passthrough(config).unwrap();

    let fh = fs_layer.open(Path::new("/dir1/data")).unwrap();
    let bytes = fs_layer.read(Path::new("/dir1/data"), 32, 4090, fh).unwrap();
    assert_eq!(bytes, pattern_at(4090, 32));
    assert_eq!(ctx.staging_file_count(), 2);

    fs_layer
        .write(Path::new("/dir1/data"), b"updated", 4090, fh)
        .unwrap();
    fs_layer.flush(Path::new("/dir1/data"), fh).unwrap();

    let backing = fs::read(ctx.storage_dir().join("dir1/data")).unwrap();
    assert_eq!(&backing[4090..4097], b"updated");

    fs_layer.release(fh).unwrap();
}

#[test]
fn config_document_drives_shard_layout() {
    let ctx = CacheContext::new().unwrap();
    let config_path = ctx.storage_dir().join("cache.json");
    let document = format!(
        r#"{{
            "cache_dir": {:?},
            "page_size": 4096,
            "ignore_dir": ["scratch"],
            "caches": [
                {{ "replacement_policy": "LRU", "size": 2, "dir": "dir1" }},
                {{ "replacement_policy": "LRU", "size": 4, "dir": "*" }}
            ]
        }}"#,
        ctx.cache_dir()
    );
    fs::write(&config_path, document).unwrap();

    let config = CacheConfig::from_file(&config_path).unwrap();
    let mut engine = ctx.engine(config).unwrap();
    assert_eq!(engine.shard_count(), 2);

    let dir1_file = ctx.patterned_file("dir1/f", MB).unwrap();
    let other_file = ctx.patterned_file("elsewhere/f", MB).unwrap();
    let scratch_file = ctx.patterned_file("scratch/f", MB).unwrap();

    let mut fh = open_rw(&dir1_file).unwrap();
    engine.read(&dir1_file, 10, 0, &mut fh).unwrap();
    assert_eq!(engine.shard_len(0), 1);

    let mut fh = open_rw(&other_file).unwrap();
    engine.read(&other_file, 10, 0, &mut fh).unwrap();
    assert_eq!(engine.shard_len(1), 1);

    let mut fh = open_rw(&scratch_file).unwrap();
    engine.read(&scratch_file, 10, 0, &mut fh).unwrap();
    assert_eq!(engine.shard_len(0) + engine.shard_len(1), 2);
}

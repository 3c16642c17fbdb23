//! Filter-engine-to-sync integration tests: filter rules actually change
//! what a real run transfers and deletes, not just what `FilterList::decide`
//! returns in isolation.

use std::fs;
use std::sync::Arc;

use relay::backend::LocalBackend;
use relay::config::SyncConfig;
use relay::filter::{FilterAction, FilterList};
use relay::{run, SyncMode, SyncPlan};
use tempfile::tempdir;

#[tokio::test]
async fn exclude_rule_skips_matching_files_on_copy() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("keep.txt"), b"keep").unwrap();
    fs::write(src_dir.path().join("skip.log"), b"skip").unwrap();

    let mut filters = FilterList::new();
    filters.add_rule(FilterAction::Exclude, "*.log").unwrap();

    let plan = SyncPlan {
        src: Arc::new(LocalBackend::new(src_dir.path().to_path_buf())),
        dst: Arc::new(LocalBackend::new(dst_dir.path().to_path_buf())),
        mode: SyncMode::Copy,
        filters,
        config: SyncConfig::default(),
    };

    let report = run(&plan).await.unwrap();

    assert_eq!(report.errors, 0);
    assert_eq!(report.transfers, 1);
    assert!(dst_dir.path().join("keep.txt").exists());
    assert!(!dst_dir.path().join("skip.log").exists());
}

#[tokio::test]
async fn delete_excluded_removes_previously_synced_then_excluded_files() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("a.txt"), b"a").unwrap();
    fs::write(src_dir.path().join("b.log"), b"b").unwrap();
    fs::write(dst_dir.path().join("b.log"), b"b").unwrap();

    let mut filters = FilterList::new();
    filters.add_rule(FilterAction::Exclude, "*.log").unwrap();

    let mut config = SyncConfig::default();
    config.delete_excluded = true;

    let plan = SyncPlan {
        src: Arc::new(LocalBackend::new(src_dir.path().to_path_buf())),
        dst: Arc::new(LocalBackend::new(dst_dir.path().to_path_buf())),
        mode: SyncMode::Sync,
        filters,
        config,
    };

    let report = run(&plan).await.unwrap();

    assert_eq!(report.errors, 0);
    assert!(dst_dir.path().join("a.txt").exists());
    assert!(!dst_dir.path().join("b.log").exists());
}

#[tokio::test]
async fn include_rule_with_trailing_exclude_all_implements_allowlist() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("wanted.txt"), b"wanted").unwrap();
    fs::write(src_dir.path().join("other.bin"), b"other").unwrap();

    let mut filters = FilterList::new();
    filters.add_rule(FilterAction::Include, "*.txt").unwrap();
    filters.add_rule(FilterAction::Exclude, "*").unwrap();

    let plan = SyncPlan {
        src: Arc::new(LocalBackend::new(src_dir.path().to_path_buf())),
        dst: Arc::new(LocalBackend::new(dst_dir.path().to_path_buf())),
        mode: SyncMode::Copy,
        filters,
        config: SyncConfig::default(),
    };

    let report = run(&plan).await.unwrap();

    assert_eq!(report.errors, 0);
    assert!(dst_dir.path().join("wanted.txt").exists());
    assert!(!dst_dir.path().join("other.bin").exists());
}

#[tokio::test]
async fn min_size_filter_excludes_small_files_from_sync() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    fs::write(src_dir.path().join("tiny.txt"), b"x").unwrap();
    fs::write(src_dir.path().join("big.txt"), vec![b'y'; 4096]).unwrap();

    let mut filters = FilterList::new();
    filters.set_min_size(1024);

    let plan = SyncPlan {
        src: Arc::new(LocalBackend::new(src_dir.path().to_path_buf())),
        dst: Arc::new(LocalBackend::new(dst_dir.path().to_path_buf())),
        mode: SyncMode::Copy,
        filters,
        config: SyncConfig::default(),
    };

    let report = run(&plan).await.unwrap();

    assert_eq!(report.errors, 0);
    assert!(!dst_dir.path().join("tiny.txt").exists());
    assert!(dst_dir.path().join("big.txt").exists());
}

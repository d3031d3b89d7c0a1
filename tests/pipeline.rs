// tests/pipeline.rs

//! End-to-end properties: dedup/expand round trip, determinism, savings,
//! packaging idempotence and split/join round trips.

mod common;

use common::{dir_digests, fast_config, pseudo_random, toolchain_bin};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;
use toolpack::archive::{ArchivePackager, PermissionPolicy, extract_archive, verify_archive};
use toolpack::checksum::{sidecar_path, verify_sidecar};
use toolpack::dedup::{CanonicalStore, MANIFEST_FILE, ManifestStore};
use toolpack::filesystem::StructureExpander;
use toolpack::hash::sha256;
use toolpack::split::{join_parts, split_artifact};
use toolpack::{
    Error, HashAlgorithm, PackagePipeline, ProgressTracker, RunOptions, Stage, dedup_directory,
};

#[test]
fn test_dedup_expand_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    let deduped = temp_dir.path().join("deduped");
    let expanded = temp_dir.path().join("expanded");
    toolchain_bin(&bin);
    let config = fast_config();

    dedup_directory(&bin, &deduped, None, &config, &RunOptions::new()).unwrap();

    let store = ManifestStore::new(&deduped);
    let manifest = store.load().unwrap();
    let canonical = CanonicalStore::open(store.canonical_dir()).unwrap();
    let report = StructureExpander::new(&manifest, &canonical)
        .with_verify(true)
        .expand(&expanded, &config, &RunOptions::new())
        .unwrap();

    assert_eq!(report.files, 6);
    assert_eq!(dir_digests(&expanded), dir_digests(&bin));
}

#[test]
fn test_manifest_is_deterministic() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    toolchain_bin(&bin);
    let config = fast_config();

    let a = temp_dir.path().join("a");
    let b = temp_dir.path().join("b");
    dedup_directory(&bin, &a, None, &config, &RunOptions::new()).unwrap();
    dedup_directory(&bin, &b, None, &config, &RunOptions::new()).unwrap();

    assert_eq!(
        fs::read(a.join(MANIFEST_FILE)).unwrap(),
        fs::read(b.join(MANIFEST_FILE)).unwrap()
    );
}

#[test]
fn test_savings_and_canonical_choice() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    toolchain_bin(&bin);

    let outcome = dedup_directory(
        &bin,
        &temp_dir.path().join("out"),
        None,
        &fast_config(),
        &RunOptions::new(),
    )
    .unwrap();
    let manifest = &outcome.manifest;

    assert_eq!(manifest.stats.duplicate_count, 3);
    assert_eq!(manifest.stats.savings, 2 * 4096 + 2048);
    assert_eq!(manifest.resolve("clang-cl"), Some("clang"));
    assert_eq!(manifest.resolve("clang++"), Some("clang"));
    assert_eq!(manifest.resolve("lld"), Some("ld.lld"));
    assert_eq!(manifest.resolve("llvm-ar"), Some("llvm-ar"));
}

#[test]
fn test_scenario_no_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    fs::write(bin.join("a"), b"X").unwrap();
    fs::write(bin.join("b"), b"Y").unwrap();

    let outcome = dedup_directory(
        &bin,
        &temp_dir.path().join("out"),
        None,
        &fast_config(),
        &RunOptions::new(),
    )
    .unwrap();

    assert_eq!(outcome.manifest.resolve("a"), Some("a"));
    assert_eq!(outcome.manifest.resolve("b"), Some("b"));
    assert_eq!(outcome.manifest.stats.savings, 0);
}

#[test]
fn test_scenario_full_duplicate_set() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    for name in ["c", "a", "b"] {
        fs::write(bin.join(name), b"X").unwrap();
    }

    let outcome = dedup_directory(
        &bin,
        &temp_dir.path().join("out"),
        None,
        &fast_config(),
        &RunOptions::new(),
    )
    .unwrap();

    for name in ["a", "b", "c"] {
        assert_eq!(outcome.manifest.resolve(name), Some("a"));
    }
    assert_eq!(outcome.manifest.stats.duplicate_count, 2);
    assert_eq!(outcome.manifest.canonical_files.len(), 1);
}

#[test]
fn test_md5_manifest_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    toolchain_bin(&bin);
    let mut config = fast_config();
    config.hash.algorithm = HashAlgorithm::Md5;

    let dest = temp_dir.path().join("out");
    let outcome = dedup_directory(&bin, &dest, None, &config, &RunOptions::new()).unwrap();
    let loaded = ManifestStore::new(&dest).load().unwrap();

    assert_eq!(loaded, outcome.manifest);
    assert_eq!(loaded.algorithm, HashAlgorithm::Md5);
    assert!(loaded.canonical_files.keys().all(|d| d.len() == 32));
}

#[test]
fn test_packaging_is_reproducible() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("llvm");
    toolchain_bin(&root.join("bin"));
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib").join("libc++.a"), b"static archive").unwrap();
    let policy = PermissionPolicy::toolchain();

    let first = temp_dir.path().join("first.tar");
    let second = temp_dir.path().join("second.tar");
    let packager = ArchivePackager::new(&policy).with_mtime(1_700_000_000);
    packager
        .package(&root, "llvm", &first, &RunOptions::new())
        .unwrap();
    packager
        .package(&root, "llvm", &second, &RunOptions::new())
        .unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    let report = verify_archive(&first, &policy).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.checked, 7);
}

#[test]
fn test_split_join_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let artifact = temp_dir.path().join("toolchain.tar.zst");
    let data = pseudo_random(250_000, 9);
    fs::write(&artifact, &data).unwrap();

    let outcome = split_artifact(&artifact, 100_000, None, &RunOptions::new()).unwrap();
    assert_eq!(outcome.parts.len(), 3);
    let lengths: Vec<u64> = outcome.record.parts.iter().map(|p| p.length).collect();
    assert_eq!(lengths, vec![100_000, 100_000, 50_000]);
    assert!(!artifact.exists());

    let joined = join_parts(&outcome.parts, &artifact, &RunOptions::new()).unwrap();
    assert!(joined.verified);
    assert_eq!(joined.sha256, sha256(&data));
    assert_eq!(fs::read(&artifact).unwrap(), data);
}

#[test]
fn test_pipeline_split_join_extract() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    let dist = temp_dir.path().join("dist");
    toolchain_bin(&bin);
    // Incompressible payload pushes the artifact over a 2 MB ceiling
    fs::write(bin.join("clangd"), pseudo_random(3 * 1024 * 1024, 4)).unwrap();

    let mut config = fast_config();
    config.split.max_size_mb = 2;
    let outcome = PackagePipeline::new(&config, "llvm")
        .unwrap()
        .run(&bin, &dist, &RunOptions::new())
        .unwrap();

    let split = outcome.split.clone().expect("artifact should be split");
    let part_size = config.split.part_size_bytes();
    assert_eq!(split.record.part_size, part_size);
    assert_eq!(
        split.parts.len() as u64,
        split.record.size.div_ceil(part_size)
    );
    assert!(!outcome.archive.exists());

    join_parts(&split.parts, &outcome.archive, &RunOptions::new()).unwrap();
    let sidecar = sidecar_path(&outcome.archive, HashAlgorithm::Sha256);
    verify_sidecar(&sidecar, config.hash.block_size).unwrap();

    let extracted = temp_dir.path().join("extracted");
    extract_archive(&outcome.archive, &extracted, false, &RunOptions::new()).unwrap();
    assert_eq!(dir_digests(&extracted.join("llvm").join("bin")), dir_digests(&bin));
}

/// Raises the cancel flag as soon as the split stage starts
struct CancelWhenSplitting {
    cancel: Arc<AtomicBool>,
}

impl ProgressTracker for CancelWhenSplitting {
    fn set_message(&self, message: &str) {
        if message == "Splitting" {
            self.cancel.store(true, Ordering::Relaxed);
        }
    }
    fn increment(&self, _amount: u64) {}
    fn set_position(&self, _position: u64) {}
    fn set_length(&self, _length: u64) {}
    fn position(&self) -> u64 {
        0
    }
    fn length(&self) -> u64 {
        0
    }
    fn finish_with_message(&self, _message: &str) {}
    fn is_finished(&self) -> bool {
        false
    }
}

#[test]
fn test_failed_split_removes_published_artifact() {
    let temp_dir = TempDir::new().unwrap();
    let bin = temp_dir.path().join("bin");
    let dist = temp_dir.path().join("dist");
    toolchain_bin(&bin);
    fs::write(bin.join("clangd"), pseudo_random(3 * 1024 * 1024, 9)).unwrap();

    let mut config = fast_config();
    config.split.max_size_mb = 2;
    let cancel = Arc::new(AtomicBool::new(false));
    let options = RunOptions::new()
        .with_cancel(cancel.clone())
        .with_progress(Arc::new(CancelWhenSplitting {
            cancel: cancel.clone(),
        }));

    let err = PackagePipeline::new(&config, "llvm")
        .unwrap()
        .run(&bin, &dist, &options)
        .unwrap_err();

    // Compression and checksums completed before the failure
    assert!(matches!(err, Error::Stage { stage: Stage::Split, .. }));
    assert!(cancel.load(Ordering::Relaxed));
    assert!(!dist.join("llvm.tar.zst").exists());
    assert!(!dist.join("llvm.tar.zst.sha256").exists());
    assert!(!dist.join("llvm.tar.zst.md5").exists());
    assert!(!dist.join("llvm.tar.zst.part1").exists());
    assert_eq!(fs::read_dir(&dist).unwrap().count(), 0);
}

// src/dedup/mod.rs

//! Content-addressed deduplication of a binary directory

pub mod canonical;
pub mod manifest;
pub mod scan;
pub mod store;

pub use canonical::CanonicalStore;
pub use manifest::{DedupStats, DeduplicationManifest, DigestGroup};
pub use scan::FileEntry;
pub use store::{CANONICAL_DIR, MANIFEST_FILE, ManifestStore};

use crate::config::PackConfig;
use crate::error::Result;
use crate::options::RunOptions;
use glob::Pattern;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Result of `dedup_directory`
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub manifest: DeduplicationManifest,
    pub manifest_path: PathBuf,
}

/// Duplicate report for a directory, nothing written
#[derive(Debug, Clone)]
pub struct Analysis {
    pub groups: Vec<DigestGroup>,
    pub stats: DedupStats,
}

impl Analysis {
    /// Groups with more than one member
    pub fn duplicate_groups(&self) -> impl Iterator<Item = &DigestGroup> {
        self.groups.iter().filter(|g| g.is_duplicated())
    }
}

/// Report duplicates in `dir` without writing anything
pub fn analyze(
    dir: &Path,
    pattern: Option<&Pattern>,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<Analysis> {
    let entries = scan::scan_directory(dir, pattern, config, options)?;
    let groups = manifest::group_by_digest(&entries);
    let stats = manifest::compute_stats(&groups);
    Ok(Analysis { groups, stats })
}

/// Deduplicate `source` into `dest`
///
/// Writes one canonical file per digest under `dest/canonical` and the
/// manifest to `dest/dedup_manifest.json`.
pub fn dedup_directory(
    source: &Path,
    dest: &Path,
    pattern: Option<&Pattern>,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<DedupOutcome> {
    let entries = scan::scan_directory(source, pattern, config, options)?;
    store_entries(source, &entries, dest, config, options)
}

/// Build the manifest for already-hashed `entries` and populate `dest`
pub fn store_entries(
    source: &Path,
    entries: &[FileEntry],
    dest: &Path,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<DedupOutcome> {
    let groups = manifest::group_by_digest(entries);
    let manifest = DeduplicationManifest::from_groups(&groups, config.hash.algorithm);

    let store = ManifestStore::new(dest);
    let canonical = CanonicalStore::create(store.canonical_dir())?;

    let pool = config.thread_pool()?;
    pool.install(|| {
        groups.par_iter().try_for_each(|group| {
            options.check_cancelled("dedup")?;
            canonical
                .store(
                    &group.digest,
                    &group.canonical,
                    &source.join(&group.canonical),
                )
                .map(|_| ())
        })
    })?;

    let keep: BTreeSet<&str> = manifest.canonical_names().collect();
    canonical.retain(&keep)?;

    let manifest_path = store.save(&manifest)?;
    info!(
        "Deduplicated {} files into {} canonical files, saved {} bytes ({:.1}%)",
        manifest.mapping.len(),
        manifest.canonical_files.len(),
        manifest.stats.savings,
        manifest.stats.savings_percent
    );

    Ok(DedupOutcome {
        manifest,
        manifest_path,
    })
}

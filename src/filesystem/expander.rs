// src/filesystem/expander.rs

//! Rebuild the full named file set from a manifest
//!
//! Each canonical file is copied into the output once; every other name in
//! its group becomes a hard link to that copy. Where hard links are not
//! possible (cross-device, unsupported filesystem) an independent copy is
//! made instead and a warning logged.

use crate::config::PackConfig;
use crate::dedup::canonical::{CanonicalStore, copy_atomic};
use crate::dedup::manifest::DeduplicationManifest;
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::hash::hash_file;
use crate::options::RunOptions;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Counts from one expansion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionReport {
    pub files: usize,
    /// Canonical files copied from the store
    pub copied: usize,
    pub hardlinked: usize,
    /// Names that fell back to a copy
    pub fallback_copies: usize,
}

/// Materializes a manifest into a directory
pub struct StructureExpander<'a> {
    manifest: &'a DeduplicationManifest,
    store: &'a CanonicalStore,
    verify: bool,
}

impl<'a> StructureExpander<'a> {
    pub fn new(manifest: &'a DeduplicationManifest, store: &'a CanonicalStore) -> Self {
        Self {
            manifest,
            store,
            verify: false,
        }
    }

    /// Re-hash every expanded file against its group digest
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Expand into `output`, which must not contain unrelated entries
    pub fn expand(
        &self,
        output: &Path,
        config: &PackConfig,
        options: &RunOptions,
    ) -> Result<ExpansionReport> {
        fs::create_dir_all(output).map_err(|e| Error::io(output, e))?;

        let aliases = self.manifest.aliases();
        let groups: Vec<(&str, Vec<&str>)> = aliases.into_iter().collect();

        // Fail before writing anything if the store is incomplete
        let sources = groups
            .iter()
            .map(|(canonical, _)| self.store.require(canonical))
            .collect::<Result<Vec<PathBuf>>>()?;

        options.begin("Expanding", self.manifest.len() as u64);
        let hardlinked = AtomicUsize::new(0);
        let fallback = AtomicUsize::new(0);

        let pool = config.thread_pool()?;
        pool.install(|| {
            groups
                .par_iter()
                .zip(sources.par_iter())
                .try_for_each(|((canonical, names), source)| {
                    options.check_cancelled("expand")?;

                    let primary = output.join(sanitize_filename(canonical)?);
                    remove_existing(&primary)?;
                    copy_atomic(source, &primary)?;
                    options.advance(1);

                    for name in names.iter().filter(|n| *n != canonical) {
                        let target = output.join(sanitize_filename(name)?);
                        remove_existing(&target)?;
                        match link_or_copy(&primary, source, &target)? {
                            Materialized::HardLink => {
                                debug!("Linked {} -> {}", name, canonical);
                                hardlinked.fetch_add(1, Ordering::Relaxed);
                            }
                            Materialized::Copy => {
                                fallback.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        options.advance(1);
                    }
                    Ok::<(), Error>(())
                })
        })?;

        let actual = fs::read_dir(output)
            .map_err(|e| Error::io(output, e))?
            .count();
        if actual != self.manifest.len() {
            return Err(Error::ExpansionIncomplete {
                dir: output.to_path_buf(),
                expected: self.manifest.len(),
                actual,
            });
        }

        if self.verify {
            pool.install(|| self.verify_output(output, config))?;
        }

        let report = ExpansionReport {
            files: actual,
            copied: groups.len(),
            hardlinked: hardlinked.into_inner(),
            fallback_copies: fallback.into_inner(),
        };
        options.finish("Expansion complete");
        info!(
            "Expanded {} files from {} canonical files ({} hard links, {} fallback copies)",
            report.files, report.copied, report.hardlinked, report.fallback_copies
        );
        Ok(report)
    }

    fn verify_output(&self, output: &Path, config: &PackConfig) -> Result<()> {
        let algorithm = self.manifest.algorithm;
        self.manifest
            .mapping
            .par_iter()
            .try_for_each(|(name, canonical)| {
                let path = output.join(name);
                let expected = self.manifest.digest_of(canonical).ok_or_else(|| {
                    Error::CanonicalMissing {
                        name: canonical.clone(),
                        path: self.store.dir().join(canonical),
                    }
                })?;
                let actual = hash_file(algorithm, &path, config.hash.block_size)?;
                if actual.as_str() != expected {
                    return Err(Error::ChecksumMismatch {
                        path,
                        algorithm,
                        expected: expected.to_string(),
                        actual: actual.value,
                    });
                }
                Ok(())
            })
    }
}

/// How a name in a group ended up on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    HardLink,
    /// Hard link failed; `target` is an independent copy of the canonical source
    Copy,
}

/// Hard-link `target` to `primary`, or copy `source` there if linking fails
pub fn link_or_copy(primary: &Path, source: &Path, target: &Path) -> Result<Materialized> {
    match fs::hard_link(primary, target) {
        Ok(()) => Ok(Materialized::HardLink),
        Err(e) => {
            warn!(
                "Hard link {} -> {} failed, copying instead: {}",
                target.display(),
                primary.display(),
                e
            );
            copy_atomic(source, target)?;
            Ok(Materialized::Copy)
        }
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(Error::InvalidPath(format!(
            "{} is a directory",
            path.display()
        ))),
        Ok(_) => fs::remove_file(path).map_err(|e| Error::io(path, e)),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{ManifestStore, dedup_directory};
    use tempfile::TempDir;

    fn deduped(temp_dir: &TempDir) -> (DeduplicationManifest, CanonicalStore) {
        let source = temp_dir.path().join("bin");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("clang"), b"compiler").unwrap();
        fs::write(source.join("clang++"), b"compiler").unwrap();
        fs::write(source.join("clang-cl"), b"compiler").unwrap();
        fs::write(source.join("lld"), b"linker").unwrap();

        let dest = temp_dir.path().join("deduped");
        dedup_directory(&source, &dest, None, &PackConfig::default(), &RunOptions::new())
            .unwrap();
        let store = ManifestStore::new(&dest);
        (
            store.load().unwrap(),
            CanonicalStore::open(store.canonical_dir()).unwrap(),
        )
    }

    #[test]
    fn test_expand_restores_all_names() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        let output = temp_dir.path().join("out");

        let report = StructureExpander::new(&manifest, &store)
            .with_verify(true)
            .expand(&output, &PackConfig::default(), &RunOptions::new())
            .unwrap();

        assert_eq!(report.files, 4);
        assert_eq!(report.copied, 2);
        assert_eq!(report.hardlinked + report.fallback_copies, 2);
        for name in ["clang", "clang++", "clang-cl"] {
            assert_eq!(fs::read(output.join(name)).unwrap(), b"compiler");
        }
        assert_eq!(fs::read(output.join("lld")).unwrap(), b"linker");
    }

    #[cfg(unix)]
    #[test]
    fn test_expand_uses_hard_links() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        let output = temp_dir.path().join("out");

        StructureExpander::new(&manifest, &store)
            .expand(&output, &PackConfig::default(), &RunOptions::new())
            .unwrap();

        let report = crate::filesystem::links::link_report(&output).unwrap();
        assert_eq!(report.unique_inodes, 2);
    }

    #[test]
    fn test_missing_canonical_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        fs::remove_file(store.dir().join("lld")).unwrap();
        let output = temp_dir.path().join("out");

        let err = StructureExpander::new(&manifest, &store)
            .expand(&output, &PackConfig::default(), &RunOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::CanonicalMissing { ref name, .. } if name == "lld"));
        assert_eq!(fs::read_dir(&output).unwrap().count(), 0);
    }

    #[test]
    fn test_unrelated_entries_fail_postcondition() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        let output = temp_dir.path().join("out");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("stray"), b"?").unwrap();

        let err = StructureExpander::new(&manifest, &store)
            .expand(&output, &PackConfig::default(), &RunOptions::new())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ExpansionIncomplete {
                expected: 4,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_verify_detects_tampering() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        fs::write(store.dir().join("lld"), b"tampered").unwrap();
        let output = temp_dir.path().join("out");

        let err = StructureExpander::new(&manifest, &store)
            .with_verify(true)
            .expand(&output, &PackConfig::default(), &RunOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_link_failure_falls_back_to_copy() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("clang");
        fs::write(&source, b"compiler").unwrap();
        let target = temp_dir.path().join("clang++");

        // Linking to a primary that was never written cannot succeed
        let primary = temp_dir.path().join("out").join("clang");
        let outcome = link_or_copy(&primary, &source, &target).unwrap();

        assert_eq!(outcome, Materialized::Copy);
        assert_eq!(fs::read(&target).unwrap(), b"compiler");
        assert!(source.exists());
    }

    #[test]
    fn test_link_or_copy_links_when_possible() {
        let temp_dir = TempDir::new().unwrap();
        let primary = temp_dir.path().join("clang");
        fs::write(&primary, b"compiler").unwrap();
        let target = temp_dir.path().join("clang-cl");

        let outcome = link_or_copy(&primary, &primary, &target).unwrap();
        assert_eq!(outcome, Materialized::HardLink);
        assert_eq!(fs::read(&target).unwrap(), b"compiler");
    }

    #[test]
    fn test_verify_respects_job_limit() {
        let temp_dir = TempDir::new().unwrap();
        let (manifest, store) = deduped(&temp_dir);
        let output = temp_dir.path().join("out");
        let mut config = PackConfig::default();
        config.jobs = 1;

        let report = StructureExpander::new(&manifest, &store)
            .with_verify(true)
            .expand(&output, &config, &RunOptions::new())
            .unwrap();
        assert_eq!(report.files, 4);
    }
}

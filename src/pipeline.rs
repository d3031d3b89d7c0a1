// src/pipeline.rs

//! End-to-end packaging of a binary directory
//!
//! Stages run strictly in order, each consuming the previous stage's output:
//!
//! 1. Hash every file of the binary directory
//! 2. Build the manifest, populate the canonical store, persist and reload it
//! 3. Expand the store into `<name>/bin` (plus an optional `<name>/lib` tree)
//! 4. Package the layout as a tar archive
//! 5. Verify archive permissions against the policy
//! 6. Compress to `<name>.tar.zst`
//! 7. Write checksum sidecars
//! 8. Split the artifact when it exceeds the size ceiling
//!
//! Intermediates live in `<output>/.<name>.work` and are removed when the run
//! ends unless asked to keep them. Any error is attributed to its stage.

use crate::archive::{ArchivePackager, PackageReport, VerifyReport, verify_archive};
use crate::checksum::{Sidecar, sidecar_path, write_sidecars};
use crate::compression::{CompressionReport, Compressor};
use crate::config::PackConfig;
use crate::dedup::{self, CanonicalStore, DeduplicationManifest, ManifestStore};
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::filesystem::{ExpansionReport, LinkReport, StructureExpander, link_report};
use crate::options::RunOptions;
use crate::split::{SplitOutcome, split_artifact};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Hash,
    Manifest,
    Expand,
    Package,
    Verify,
    Compress,
    Checksum,
    Split,
}

impl Stage {
    /// All stages in order
    pub fn all() -> &'static [Stage] {
        &[
            Self::Hash,
            Self::Manifest,
            Self::Expand,
            Self::Package,
            Self::Verify,
            Self::Compress,
            Self::Checksum,
            Self::Split,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Manifest => "manifest",
            Self::Expand => "expand",
            Self::Package => "package",
            Self::Verify => "verify",
            Self::Compress => "compress",
            Self::Checksum => "checksum",
            Self::Split => "split",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a packaging run produced
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub manifest: DeduplicationManifest,
    pub expansion: ExpansionReport,
    pub links: LinkReport,
    pub package: PackageReport,
    pub verify: VerifyReport,
    pub compression: CompressionReport,
    /// `<output>/<name>.tar.zst`; removed again if the artifact was split
    pub archive: PathBuf,
    pub sidecars: Vec<Sidecar>,
    pub split: Option<SplitOutcome>,
    /// Set when intermediates were kept
    pub work_dir: Option<PathBuf>,
}

impl PipelineOutcome {
    /// Files a consumer should publish
    pub fn published_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        match &self.split {
            Some(split) => {
                files.extend(split.parts.iter().cloned());
                files.push(split.record_path.clone());
                files.push(split.join_script.clone());
            }
            None => files.push(self.archive.clone()),
        }
        files.extend(self.sidecars.iter().map(|s| s.path.clone()));
        files
    }
}

/// Packages one binary directory into a distributable artifact
pub struct PackagePipeline<'a> {
    config: &'a PackConfig,
    name: String,
    lib_dir: Option<PathBuf>,
    keep_intermediate: bool,
}

impl<'a> PackagePipeline<'a> {
    /// `name` becomes the archive root directory and artifact stem
    pub fn new(config: &'a PackConfig, name: &str) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            name: sanitize_filename(name)?,
            lib_dir: None,
            keep_intermediate: false,
        })
    }

    /// Copy this tree into `<name>/lib` before packaging
    pub fn with_lib_dir(mut self, lib_dir: impl Into<PathBuf>) -> Self {
        self.lib_dir = Some(lib_dir.into());
        self
    }

    pub fn keep_intermediate(mut self, keep: bool) -> Self {
        self.keep_intermediate = keep;
        self
    }

    /// Final artifact path inside `output_dir`
    pub fn archive_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.tar.zst", self.name))
    }

    /// Run every stage
    ///
    /// On failure, any artifact or sidecar already written to `output_dir`
    /// by this run is removed again.
    pub fn run(
        &self,
        binary_dir: &Path,
        output_dir: &Path,
        options: &RunOptions,
    ) -> Result<PipelineOutcome> {
        if !binary_dir.is_dir() {
            return Err(Error::io(
                binary_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "binary directory not found"),
            ));
        }
        if let Some(lib_dir) = &self.lib_dir
            && !lib_dir.is_dir()
        {
            return Err(Error::io(
                lib_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "library directory not found"),
            ));
        }
        fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;

        let work = WorkDir::create(
            output_dir.join(format!(".{}.work", self.name)),
            self.keep_intermediate,
        )?;

        let mut produced = Vec::new();
        match self.run_stages(binary_dir, output_dir, &work, options, &mut produced) {
            Ok(mut outcome) => {
                outcome.work_dir = self.keep_intermediate.then(|| work.path.clone());
                Ok(outcome)
            }
            Err(e) => {
                for path in produced.iter().filter(|p| p.exists()) {
                    if let Err(remove_err) = fs::remove_file(path) {
                        warn!("Could not remove {}: {}", path.display(), remove_err);
                    }
                }
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        binary_dir: &Path,
        output_dir: &Path,
        work: &WorkDir,
        options: &RunOptions,
        produced: &mut Vec<PathBuf>,
    ) -> Result<PipelineOutcome> {
        let config = self.config;
        let policy = config.permission_policy()?;
        info!(
            "Packaging {} from {} into {}",
            self.name,
            binary_dir.display(),
            output_dir.display()
        );

        let entries = stage(Stage::Hash, || {
            dedup::scan::scan_directory(binary_dir, None, config, options)
        })?;

        let deduped = work.path.join("deduped");
        let manifest = stage(Stage::Manifest, || {
            dedup::store_entries(binary_dir, &entries, &deduped, config, options)?;
            // Expansion works from what was persisted, not the in-memory copy
            ManifestStore::new(&deduped).load()
        })?;

        let staging = work.path.join(&self.name);
        let (expansion, links) = stage(Stage::Expand, || {
            if staging.exists() {
                fs::remove_dir_all(&staging).map_err(|e| Error::io(&staging, e))?;
            }
            let bin = staging.join("bin");
            let canonical = CanonicalStore::open(ManifestStore::new(&deduped).canonical_dir())?;
            let expansion = StructureExpander::new(&manifest, &canonical).expand(
                &bin,
                config,
                options,
            )?;
            let links = link_report(&bin)?;
            info!(
                "{} files share {} inodes ({} hard-linked)",
                links.total_files,
                links.unique_inodes,
                links.linked_files()
            );
            if let Some(lib_dir) = &self.lib_dir {
                let copied = copy_tree(lib_dir, &staging.join("lib"), options)?;
                info!("Copied {} library entries from {}", copied, lib_dir.display());
            }
            Ok((expansion, links))
        })?;

        let tar_path = work.path.join(format!("{}.tar", self.name));
        let package = stage(Stage::Package, || {
            ArchivePackager::new(&policy).package(&staging, &self.name, &tar_path, options)
        })?;

        let verify = stage(Stage::Verify, || verify_archive(&tar_path, &policy))?;

        let archive = self.archive_path(output_dir);
        let compression = stage(Stage::Compress, || {
            let compressor = Compressor::from_config(&config.compression)?;
            let report = compressor.compress_file(&tar_path, &archive, options)?;
            produced.push(archive.clone());
            Ok(report)
        })?;

        let sidecars = stage(Stage::Checksum, || {
            produced.extend(
                config
                    .checksum
                    .algorithms
                    .iter()
                    .map(|a| sidecar_path(&archive, *a)),
            );
            write_sidecars(&archive, &config.checksum.algorithms, config.hash.block_size)
        })?;

        let split = stage(Stage::Split, || {
            let size = fs::metadata(&archive)
                .map_err(|e| Error::io(&archive, e))?
                .len();
            if size <= config.split.max_size_bytes() {
                debug!(
                    "{} is {} bytes, under the {} MB ceiling",
                    archive.display(),
                    size,
                    config.split.max_size_mb
                );
                return Ok(None);
            }
            split_artifact(&archive, config.split.part_size_bytes(), None, options).map(Some)
        })?;

        info!(
            "Packaged {}: {} files, {} canonical, {} -> {} bytes{}",
            self.name,
            manifest.len(),
            manifest.canonical_files.len(),
            package.payload_bytes,
            compression.output_size,
            split
                .as_ref()
                .map(|s| format!(", split into {} parts", s.parts.len()))
                .unwrap_or_default()
        );

        Ok(PipelineOutcome {
            manifest,
            expansion,
            links,
            package,
            verify,
            compression,
            archive,
            sidecars,
            split,
            work_dir: None,
        })
    }
}

fn stage<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    debug!("Starting {} stage", stage);
    f().map_err(|e| e.in_stage(stage))
}

/// Scratch directory removed on drop unless kept
struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    fn create(path: PathBuf, keep: bool) -> Result<Self> {
        if path.exists() {
            fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
        Ok(Self { path, keep })
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            info!("Keeping intermediates in {}", self.path.display());
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            warn!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

/// Copy a directory tree, recreating symlinks rather than following them
fn copy_tree(source: &Path, dest: &Path, options: &RunOptions) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
        options.check_cancelled("copy")?;
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            Error::io(&path, e.into())
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            copy_symlink(&link, &target)?;
            copied += 1;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target).map_err(|e| Error::io(target, e))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> Result<()> {
    warn!(
        "Symlinks not supported, skipping {} -> {}",
        target.display(),
        link.display()
    );
    Ok(())
}

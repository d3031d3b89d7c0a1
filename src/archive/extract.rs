// src/archive/extract.rs

//! Unpack a packaged archive
//!
//! Every entry path is sanitized against the output directory. Hard link
//! records are restored as links, or as independent copies when asked to
//! break them.

use crate::compression::open_decoder;
use crate::error::{Error, Result};
use crate::filesystem::path::safe_join;
use crate::options::RunOptions;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

/// Counts from one extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub files: usize,
    pub hardlinks: usize,
    pub symlinks: usize,
    pub directories: usize,
}

/// Decompress (if needed) and unpack `archive` into `output`
pub fn extract_archive(
    archive: &Path,
    output: &Path,
    break_hardlinks: bool,
    options: &RunOptions,
) -> Result<ExtractReport> {
    let (format, reader) = open_decoder(archive)?;
    info!(
        "Extracting {} ({}) into {}",
        archive.display(),
        format,
        output.display()
    );
    fs::create_dir_all(output).map_err(|e| Error::io(output, e))?;
    let root = ConfinedRoot::new(output)?;

    let io_err = |e: io::Error| Error::io(archive, e);
    let mut tar = Archive::new(reader);
    let mut report = ExtractReport::default();

    for entry in tar.entries().map_err(io_err)? {
        options.check_cancelled("extract")?;
        let mut entry = entry.map_err(io_err)?;
        let entry_path = entry.path().map_err(io_err)?.into_owned();
        let target = safe_join(output, &entry_path)?;
        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().map_err(io_err)?;

        match entry_type {
            EntryType::Directory => {
                root.create_dir(&target)?;
                report.directories += 1;
            }
            EntryType::Regular | EntryType::Continuous => {
                root.create_parent(&target)?;
                remove_existing(&target)?;
                let mut file = File::create(&target).map_err(|e| Error::io(&target, e))?;
                io::copy(&mut entry, &mut file).map_err(|e| Error::io(&target, e))?;
                set_mode(&target, mode)?;
                report.files += 1;
            }
            EntryType::Link => {
                let link_name = entry
                    .link_name()
                    .map_err(io_err)?
                    .ok_or_else(|| {
                        Error::InvalidPath(format!("hard link without target: {}", entry_path.display()))
                    })?
                    .into_owned();
                let source = safe_join(output, &link_name)?;
                root.check(&source)?;
                root.create_parent(&target)?;
                remove_existing(&target)?;

                if break_hardlinks {
                    fs::copy(&source, &target).map_err(|e| Error::io(&target, e))?;
                    set_mode(&target, mode)?;
                    report.files += 1;
                } else {
                    match fs::hard_link(&source, &target) {
                        Ok(()) => report.hardlinks += 1,
                        Err(e) => {
                            warn!(
                                "Hard link {} -> {} failed, copying instead: {}",
                                target.display(),
                                source.display(),
                                e
                            );
                            fs::copy(&source, &target).map_err(|e| Error::io(&target, e))?;
                            report.files += 1;
                        }
                    }
                }
            }
            EntryType::Symlink => {
                let link_name = entry
                    .link_name()
                    .map_err(io_err)?
                    .ok_or_else(|| {
                        Error::InvalidPath(format!("symlink without target: {}", entry_path.display()))
                    })?
                    .into_owned();
                root.create_parent(&target)?;
                remove_existing(&target)?;
                create_symlink(&link_name, &target)?;
                report.symlinks += 1;
            }
            other => {
                debug!("Skipping {:?} entry {}", other, entry_path.display());
            }
        }
    }

    info!(
        "Extracted {} files, {} hard links, {} symlinks",
        report.files, report.hardlinks, report.symlinks
    );
    Ok(report)
}

/// Output directory that resolved paths must stay under
///
/// Earlier entries may have planted symlinks, so checks resolve the real
/// location on disk rather than trusting the joined path.
struct ConfinedRoot {
    canonical: PathBuf,
}

impl ConfinedRoot {
    fn new(output: &Path) -> Result<Self> {
        let canonical = output.canonicalize().map_err(|e| Error::io(output, e))?;
        Ok(Self { canonical })
    }

    /// `path` must exist and resolve inside the root
    fn check(&self, path: &Path) -> Result<()> {
        let resolved = path.canonicalize().map_err(|e| Error::io(path, e))?;
        if !resolved.starts_with(&self.canonical) {
            return Err(Error::PathTraversal(format!(
                "{} resolves to {}, outside {}",
                path.display(),
                resolved.display(),
                self.canonical.display()
            )));
        }
        Ok(())
    }

    /// Create `dir` without following a link out of the root
    fn create_dir(&self, dir: &Path) -> Result<()> {
        // Nothing may be created until the deepest existing ancestor is known to be inside
        if let Some(existing) = dir
            .ancestors()
            .find(|p| !p.as_os_str().is_empty() && fs::symlink_metadata(p).is_ok())
        {
            self.check(existing)?;
        }
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        self.check(dir)
    }

    fn create_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) => self.create_dir(parent),
            None => Ok(()),
        }
    }
}

fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => fs::remove_file(path).map_err(|e| Error::io(path, e)),
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link).map_err(|e| Error::io(link, e))
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> Result<()> {
    warn!(
        "Symlinks not supported, skipping {} -> {}",
        link.display(),
        target.display()
    );
    Ok(())
}

// src/archive/packager.rs

//! Write a directory tree as a reproducible tar archive
//!
//! Entries are emitted in sorted order with a fixed mtime, uid/gid 0 and
//! modes taken from the `PermissionPolicy`. Files that share an inode are
//! stored once; later names become hard link records pointing at the first.

use super::policy::PermissionPolicy;
use crate::error::{Error, Result};
use crate::filesystem::links::inode_key;
use crate::filesystem::path::archive_path;
use crate::options::RunOptions;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tar::{Builder, EntryType, Header};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 2024-01-01 00:00:00 UTC
pub const DEFAULT_MTIME: u64 = 1704067200;

const DIR_MODE: u32 = 0o755;
const SYMLINK_MODE: u32 = 0o777;

/// Entry mtime, honouring `SOURCE_DATE_EPOCH`
pub fn source_date_epoch() -> u64 {
    std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_MTIME)
}

/// What went into an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub files: usize,
    pub hardlinks: usize,
    pub symlinks: usize,
    pub directories: usize,
    /// Payload bytes stored, excluding tar headers
    pub payload_bytes: u64,
}

/// Builds tar archives under a permission policy
pub struct ArchivePackager<'a> {
    policy: &'a PermissionPolicy,
    mtime: u64,
}

impl<'a> ArchivePackager<'a> {
    pub fn new(policy: &'a PermissionPolicy) -> Self {
        Self {
            policy,
            mtime: source_date_epoch(),
        }
    }

    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Package `root` into the file `output`
    ///
    /// Every entry is stored under `archive_root/`. The archive is written
    /// to a temporary file and renamed into place when complete.
    pub fn package(
        &self,
        root: &Path,
        archive_root: &str,
        output: &Path,
        options: &RunOptions,
    ) -> Result<PackageReport> {
        let parent = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let temp = tempfile::Builder::new()
            .prefix(".toolpack")
            .suffix(".tar.incomplete")
            .tempfile_in(parent)
            .map_err(|e| Error::io(parent, e))?;

        info!("Packaging {} -> {}", root.display(), output.display());
        let (report, writer) = self.write_to(root, archive_root, BufWriter::new(temp), options)?;
        let temp = writer
            .into_inner()
            .map_err(|e| Error::io(output, e.into_error()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::io(temp.path(), e))?;
        temp.persist(output).map_err(|e| Error::io(output, e.error))?;

        info!(
            "Archived {} files, {} hard links, {} symlinks ({} bytes)",
            report.files, report.hardlinks, report.symlinks, report.payload_bytes
        );
        Ok(report)
    }

    /// Stream the archive of `root` into `writer`
    pub fn write_to<W: Write>(
        &self,
        root: &Path,
        archive_root: &str,
        writer: W,
        options: &RunOptions,
    ) -> Result<(PackageReport, W)> {
        if !root.is_dir() {
            return Err(Error::io(
                root,
                io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let mut builder = Builder::new(writer);
        builder.follow_symlinks(false);
        let mut report = PackageReport::default();
        let mut first_by_inode: HashMap<(u64, u64), String> = HashMap::new();
        let tar_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: io::Error| Error::io(&path, e)
        };

        let archive_root = archive_path(Path::new(archive_root));
        if !archive_root.is_empty() {
            let mut header = self.header(EntryType::Directory, DIR_MODE, 0);
            builder
                .append_data(&mut header, &archive_root, io::empty())
                .map_err(tar_err(root))?;
            report.directories += 1;
        }

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                Error::io(&path, e.into())
            })?;
            options.check_cancelled("package")?;

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let name = if archive_root.is_empty() {
                archive_path(relative)
            } else {
                format!("{}/{}", archive_root, archive_path(relative))
            };
            let file_type = entry.file_type();

            if file_type.is_dir() {
                let mut header = self.header(EntryType::Directory, DIR_MODE, 0);
                builder
                    .append_data(&mut header, &name, io::empty())
                    .map_err(tar_err(path))?;
                report.directories += 1;
            } else if file_type.is_symlink() {
                let target = fs::read_link(path).map_err(|e| Error::io(path, e))?;
                let mut header = self.header(EntryType::Symlink, SYMLINK_MODE, 0);
                builder
                    .append_link(&mut header, &name, &target)
                    .map_err(tar_err(path))?;
                report.symlinks += 1;
            } else if file_type.is_file() {
                let metadata = entry.metadata().map_err(|e| {
                    Error::io(path, e.into_io_error().unwrap_or_else(|| io::Error::other("metadata")))
                })?;
                let mode = self.policy.mode_for(&name);

                let key = inode_key(&metadata);
                if let Some(first) = key.and_then(|k| first_by_inode.get(&k)) {
                    let mut header = self.header(EntryType::Link, mode, 0);
                    builder
                        .append_link(&mut header, &name, first)
                        .map_err(tar_err(path))?;
                    debug!("{} -> {} (hard link)", name, first);
                    report.hardlinks += 1;
                    continue;
                }

                let file = File::open(path).map_err(|e| Error::io(path, e))?;
                let mut header = self.header(EntryType::Regular, mode, metadata.len());
                builder
                    .append_data(&mut header, &name, file)
                    .map_err(tar_err(path))?;
                debug!("{} mode {:o}", name, mode);

                if let Some(key) = key {
                    first_by_inode.insert(key, name);
                }
                report.files += 1;
                report.payload_bytes += metadata.len();
            } else {
                debug!("Skipping special file: {}", path.display());
            }
        }

        let writer = builder.into_inner().map_err(tar_err(root))?;
        Ok((report, writer))
    }

    fn header(&self, entry_type: EntryType, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(self.mtime);
        header.set_uid(0);
        header.set_gid(0);
        header.set_cksum();
        header
    }
}

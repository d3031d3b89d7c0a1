// src/filesystem/links.rs

//! Hard link inspection

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, Metadata};
use std::path::Path;
use walkdir::WalkDir;

/// Identity of the inode behind a file, if the platform exposes one
#[cfg(unix)]
pub fn inode_key(metadata: &Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
pub fn inode_key(_metadata: &Metadata) -> Option<(u64, u64)> {
    None
}

/// How the files under a directory share inodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub total_files: usize,
    pub unique_inodes: usize,
    /// Relative paths sharing an inode, only groups of two or more
    pub hardlink_groups: Vec<Vec<String>>,
}

impl LinkReport {
    /// Files that did not need their own inode
    pub fn linked_files(&self) -> usize {
        self.total_files - self.unique_inodes
    }
}

/// Group regular files under `dir` by inode
pub fn link_report(dir: &Path) -> Result<LinkReport> {
    let mut by_inode: BTreeMap<(u64, u64), Vec<String>> = BTreeMap::new();
    let mut total_files = 0;
    let mut unlinked = 0;

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(&path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        total_files += 1;

        let metadata = fs::metadata(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        match inode_key(&metadata) {
            Some(key) => by_inode.entry(key).or_default().push(relative),
            None => unlinked += 1,
        }
    }

    let unique_inodes = by_inode.len() + unlinked;
    let hardlink_groups = by_inode
        .into_values()
        .filter(|names| names.len() > 1)
        .collect();

    Ok(LinkReport {
        total_files,
        unique_inodes,
        hardlink_groups,
    })
}

// src/dedup/scan.rs

//! Hash every file of a flat binary directory

use crate::config::PackConfig;
use crate::error::{Error, Result};
use crate::hash::{ContentHash, hash_file};
use crate::options::RunOptions;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A hashed input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name within the scanned directory
    pub name: String,
    pub digest: ContentHash,
    /// Size in bytes
    pub size: u64,
}

/// List the regular files directly under `dir`, sorted by name
///
/// Subdirectories are skipped; only one level is deduplicated.
pub fn list_files(dir: &Path, pattern: Option<&Pattern>) -> Result<Vec<(String, PathBuf)>> {
    let read_dir = fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|e| Error::io(&path, e))?;
        if !metadata.is_file() {
            debug!("Skipping non-file entry: {}", path.display());
            continue;
        }

        let name = entry.file_name().to_str().map(str::to_string).ok_or_else(|| {
            Error::InvalidPath(format!("non UTF-8 file name: {}", path.display()))
        })?;

        if let Some(pattern) = pattern
            && !pattern.matches(&name)
        {
            continue;
        }

        files.push((name, path));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Hash the files of `dir` in parallel
///
/// Any unreadable file aborts the scan with its path. Cancellation is
/// checked before each file.
pub fn scan_directory(
    dir: &Path,
    pattern: Option<&Pattern>,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<Vec<FileEntry>> {
    let files = list_files(dir, pattern)?;
    let algorithm = config.hash.algorithm;
    let block_size = config.hash.block_size;

    info!(
        "Hashing {} files in {} ({})",
        files.len(),
        dir.display(),
        algorithm
    );
    options.begin("Hashing", files.len() as u64);

    let pool = config.thread_pool()?;
    let entries = pool.install(|| {
        files
            .par_iter()
            .map(|(name, path)| {
                options.check_cancelled("hash")?;
                let size = fs::metadata(path).map_err(|e| Error::io(path, e))?.len();
                let digest = hash_file(algorithm, path, block_size)?;
                debug!("{} {} ({} bytes)", digest, name, size);
                options.advance(1);
                Ok(FileEntry {
                    name: name.clone(),
                    digest,
                    size,
                })
            })
            .collect::<Result<Vec<_>>>()
    })?;

    options.finish("Hashing complete");
    Ok(entries)
}

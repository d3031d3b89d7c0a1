// src/dedup/canonical.rs

//! Canonical file store
//!
//! Holds exactly one physical file per unique digest, named after the
//! group's canonical member. Writers claim a digest before copying, so
//! concurrent requests for the same content produce a single write.

use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

type Claim = Arc<Mutex<Option<PathBuf>>>;

/// Directory of canonical files
#[derive(Debug)]
pub struct CanonicalStore {
    dir: PathBuf,
    claims: Mutex<HashMap<String, Claim>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CanonicalStore {
    /// Create the store directory if needed
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            debug!("Created canonical store: {}", dir.display());
        }
        Ok(Self::with_dir(dir))
    }

    /// Open an existing store
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(Error::io(
                &dir,
                io::Error::new(io::ErrorKind::NotFound, "canonical store not found"),
            ));
        }
        Ok(Self::with_dir(dir))
    }

    fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a canonical file, whether or not it exists
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        Ok(self.dir.join(sanitize_filename(name)?))
    }

    /// Path of a canonical file that must exist
    pub fn require(&self, name: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(Error::CanonicalMissing {
                name: name.to_string(),
                path,
            });
        }
        Ok(path)
    }

    fn claim(&self, digest: &str) -> Claim {
        lock(&self.claims)
            .entry(digest.to_string())
            .or_default()
            .clone()
    }

    /// Copy `source` in as the canonical file for `digest`
    ///
    /// The first caller for a digest writes it; later callers get the
    /// existing path back without touching the disk.
    pub fn store(&self, digest: &str, name: &str, source: &Path) -> Result<PathBuf> {
        let claim = self.claim(digest);
        let mut stored = lock(&claim);
        if let Some(path) = stored.as_ref() {
            debug!("Digest {} already stored as {}", digest, path.display());
            return Ok(path.clone());
        }

        let target = self.path_for(name)?;
        copy_atomic(source, &target)?;
        debug!("Stored canonical {} ({})", name, digest);

        *stored = Some(target.clone());
        Ok(target)
    }

    /// Remove files left over from an earlier run
    pub fn retain(&self, names: &BTreeSet<&str>) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let keep = entry
                .file_name()
                .to_str()
                .is_some_and(|name| names.contains(name));
            if !keep {
                let path = entry.path();
                warn!("Removing stale canonical entry: {}", path.display());
                if path.is_dir() {
                    fs::remove_dir_all(&path).map_err(|e| Error::io(&path, e))?;
                } else {
                    fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                }
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Copy through a temp file in the target directory, then rename
///
/// A failed or interrupted copy leaves nothing at `target`.
pub fn copy_atomic(source: &Path, target: &Path) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("no parent: {}", target.display())))?;

    let mut input = File::open(source).map_err(|e| Error::io(source, e))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".toolpack")
        .suffix(".incomplete")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))?;
    io::copy(&mut input, temp.as_file_mut()).map_err(|e| Error::io(target, e))?;
    temp.as_file().sync_all().map_err(|e| Error::io(target, e))?;
    temp.persist(target).map_err(|e| Error::io(target, e.error))?;
    Ok(())
}

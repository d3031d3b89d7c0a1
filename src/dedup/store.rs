// src/dedup/store.rs

//! On-disk layout of a deduplicated directory
//!
//! ```text
//! <root>/
//!   dedup_manifest.json
//!   canonical/<canonical-name>...
//! ```
//!
//! The manifest is written once, atomically, and validated on every load.

use crate::dedup::manifest::{DedupStats, DeduplicationManifest, MANIFEST_VERSION};
use crate::error::{Error, Result};
use crate::filesystem::path::sanitize_filename;
use crate::hash::{ContentHash, HashAlgorithm};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest file name inside a deduplicated directory
pub const MANIFEST_FILE: &str = "dedup_manifest.json";

/// Canonical store subdirectory
pub const CANONICAL_DIR: &str = "canonical";

/// Manifest as found on disk, including older layouts
#[derive(Debug, Deserialize)]
struct StoredManifest {
    version: Option<u32>,
    algorithm: Option<HashAlgorithm>,
    #[serde(alias = "manifest")]
    mapping: BTreeMap<String, String>,
    canonical_files: BTreeMap<String, String>,
    #[serde(default)]
    stats: DedupStats,
}

/// Reads and writes the manifest of one deduplicated directory
#[derive(Debug, Clone)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn canonical_dir(&self) -> PathBuf {
        self.root.join(CANONICAL_DIR)
    }

    /// Write the manifest atomically as pretty JSON
    pub fn save(&self, manifest: &DeduplicationManifest) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(|e| Error::io(&self.root, e))?;
        let path = self.manifest_path();

        let mut json = serde_json::to_string_pretty(manifest)?;
        json.push('\n');

        let mut temp = tempfile::Builder::new()
            .prefix(".dedup_manifest")
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| Error::io(&self.root, e))?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| Error::io(temp.path(), e))?;
        temp.persist(&path).map_err(|e| Error::io(&path, e.error))?;

        info!(
            "Saved manifest: {} ({} names, {} canonical)",
            path.display(),
            manifest.mapping.len(),
            manifest.canonical_files.len()
        );
        Ok(path)
    }

    /// Load and validate the manifest
    pub fn load(&self) -> Result<DeduplicationManifest> {
        let path = self.manifest_path();
        if !path.is_file() {
            return Err(Error::ManifestMissing(path));
        }
        let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let manifest = parse_manifest(&path, &content)?;
        debug!(
            "Loaded manifest v{} from {} ({} names)",
            manifest.version,
            path.display(),
            manifest.mapping.len()
        );
        Ok(manifest)
    }
}

/// Parse manifest JSON; `path` is used for error messages
pub fn parse_manifest(path: &Path, content: &str) -> Result<DeduplicationManifest> {
    let invalid = |reason: String| Error::InvalidManifest {
        path: path.to_path_buf(),
        reason,
    };

    let stored: StoredManifest =
        serde_json::from_str(content).map_err(|e| invalid(e.to_string()))?;

    let version = stored.version.unwrap_or(1);
    if version == 0 || version > MANIFEST_VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }
    // Version 1 manifests were always MD5
    let algorithm = stored.algorithm.unwrap_or(if version == 1 {
        HashAlgorithm::Md5
    } else {
        HashAlgorithm::Sha256
    });

    for digest in stored.canonical_files.keys() {
        ContentHash::new(algorithm, digest.as_str())
            .map_err(|e| invalid(format!("digest '{}': {}", digest, e)))?;
    }

    let canonicals: BTreeSet<&str> = stored.canonical_files.values().map(String::as_str).collect();
    if canonicals.len() != stored.canonical_files.len() {
        return Err(invalid(
            "a canonical name is registered for more than one digest".to_string(),
        ));
    }

    for (name, canonical) in &stored.mapping {
        sanitize_filename(name).map_err(|e| invalid(e.to_string()))?;
        if !canonicals.contains(canonical.as_str()) {
            return Err(invalid(format!(
                "'{}' maps to '{}', which is not a canonical file",
                name, canonical
            )));
        }
    }

    for canonical in &canonicals {
        sanitize_filename(canonical).map_err(|e| invalid(e.to_string()))?;
        if stored.mapping.get(*canonical).map(String::as_str) != Some(*canonical) {
            return Err(invalid(format!(
                "canonical file '{}' does not map to itself",
                canonical
            )));
        }
    }

    Ok(DeduplicationManifest {
        version,
        algorithm,
        mapping: stored.mapping,
        canonical_files: stored.canonical_files,
        stats: stored.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::scan::FileEntry;
    use crate::hash::hash_bytes;
    use tempfile::TempDir;

    fn sample_manifest() -> DeduplicationManifest {
        let entries: Vec<FileEntry> = [("clang", b"cc"), ("clang++", b"cc"), ("lld", b"ld")]
            .iter()
            .map(|(name, content)| FileEntry {
                name: name.to_string(),
                digest: hash_bytes(HashAlgorithm::Sha256, *content),
                size: content.len() as u64,
            })
            .collect();
        DeduplicationManifest::build(&entries, HashAlgorithm::Sha256)
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path());
        let manifest = sample_manifest();

        let path = store.save(&manifest).unwrap();
        assert_eq!(path, temp_dir.path().join(MANIFEST_FILE));

        let loaded = store.load().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_save_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path());

        store.save(&sample_manifest()).unwrap();
        let first = std::fs::read(store.manifest_path()).unwrap();
        store.save(&sample_manifest()).unwrap();
        let second = std::fs::read(store.manifest_path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path());
        assert!(matches!(store.load(), Err(Error::ManifestMissing(_))));
    }

    #[test]
    fn test_malformed_manifest_names_path() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path());
        std::fs::write(store.manifest_path(), "{ not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, Error::InvalidManifest { .. }));
        assert!(err.to_string().contains(MANIFEST_FILE));
    }

    #[test]
    fn test_legacy_manifest_key() {
        let legacy = r#"{
  "manifest": {"clang.exe": "clang++.exe", "clang++.exe": "clang++.exe"},
  "canonical_files": {"0123456789abcdef0123456789abcdef": "clang++.exe"},
  "stats": {"total_size": 4, "deduped_size": 2, "savings": 2,
            "savings_percent": 50.0, "duplicate_count": 1}
}"#;
        let manifest = parse_manifest(Path::new("legacy.json"), legacy).unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.algorithm, HashAlgorithm::Md5);
        assert_eq!(manifest.resolve("clang.exe"), Some("clang++.exe"));
        assert_eq!(manifest.stats.duplicate_count, 1);
    }

    #[test]
    fn test_dangling_mapping_rejected() {
        let content = r#"{
  "version": 2, "algorithm": "md5",
  "mapping": {"a": "a", "b": "c"},
  "canonical_files": {"0123456789abcdef0123456789abcdef": "a"}
}"#;
        let err = parse_manifest(Path::new("m.json"), content).unwrap_err();
        assert!(err.to_string().contains("'b' maps to 'c'"));
    }

    #[test]
    fn test_traversal_name_rejected() {
        let content = r#"{
  "version": 2, "algorithm": "md5",
  "mapping": {"../evil": "a", "a": "a"},
  "canonical_files": {"0123456789abcdef0123456789abcdef": "a"}
}"#;
        assert!(parse_manifest(Path::new("m.json"), content).is_err());
    }

    #[test]
    fn test_future_version_rejected() {
        let content = r#"{"version": 99, "mapping": {}, "canonical_files": {}}"#;
        let err = parse_manifest(Path::new("m.json"), content).unwrap_err();
        assert!(err.to_string().contains("unsupported version 99"));
    }
}

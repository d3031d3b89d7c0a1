// src/dedup/manifest.rs

//! Deduplication manifest
//!
//! Groups hashed files by digest, picks the lexicographically smallest name
//! of each group as canonical and records `name -> canonical` for every
//! file. Keys are kept in `BTreeMap`s so the serialized form is identical
//! across runs and machines.

use crate::dedup::scan::FileEntry;
use crate::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 2;

/// Space accounting for one deduplication run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Sum of every file's size, duplicates included
    pub total_size: u64,
    /// Sum of one size per unique digest
    pub deduped_size: u64,
    pub savings: u64,
    pub savings_percent: f64,
    /// Files that are a copy of some canonical file
    pub duplicate_count: usize,
}

/// Files sharing one digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestGroup {
    pub digest: String,
    /// Smallest member name
    pub canonical: String,
    /// All member names, sorted, canonical first
    pub members: Vec<String>,
    /// Size of each member
    pub size: u64,
}

impl DigestGroup {
    /// Names other than the canonical
    pub fn duplicates(&self) -> &[String] {
        &self.members[1..]
    }

    pub fn is_duplicated(&self) -> bool {
        self.members.len() > 1
    }

    /// Bytes stored more than once
    pub fn wasted_bytes(&self) -> u64 {
        self.size * self.duplicates().len() as u64
    }
}

/// Group entries by digest, ordered by digest
pub fn group_by_digest(entries: &[FileEntry]) -> Vec<DigestGroup> {
    let mut by_digest: BTreeMap<&str, (u64, Vec<&str>)> = BTreeMap::new();
    for entry in entries {
        by_digest
            .entry(entry.digest.as_str())
            .or_insert_with(|| (entry.size, Vec::new()))
            .1
            .push(entry.name.as_str());
    }

    by_digest
        .into_iter()
        .map(|(digest, (size, mut names))| {
            names.sort_unstable();
            names.dedup();
            let members: Vec<String> = names.into_iter().map(str::to_string).collect();
            DigestGroup {
                digest: digest.to_string(),
                canonical: members[0].clone(),
                members,
                size,
            }
        })
        .collect()
}

/// Compute statistics from digest groups
pub fn compute_stats(groups: &[DigestGroup]) -> DedupStats {
    let total_size: u64 = groups
        .iter()
        .map(|g| g.size * g.members.len() as u64)
        .sum();
    let deduped_size: u64 = groups.iter().map(|g| g.size).sum();
    let savings = total_size - deduped_size;
    let savings_percent = if total_size > 0 {
        savings as f64 / total_size as f64 * 100.0
    } else {
        0.0
    };

    DedupStats {
        total_size,
        deduped_size,
        savings,
        savings_percent,
        duplicate_count: groups.iter().map(|g| g.duplicates().len()).sum(),
    }
}

/// Persistable manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicationManifest {
    pub version: u32,
    /// Digest algorithm used for `canonical_files` keys
    pub algorithm: HashAlgorithm,
    /// Every original name to its canonical name
    pub mapping: BTreeMap<String, String>,
    /// Digest to canonical name
    pub canonical_files: BTreeMap<String, String>,
    pub stats: DedupStats,
}

impl DeduplicationManifest {
    /// Build a manifest from hashed entries
    ///
    /// Entries must all use `algorithm`. A set without duplicates still
    /// yields a manifest where every name maps to itself.
    pub fn build(entries: &[FileEntry], algorithm: HashAlgorithm) -> Self {
        let groups = group_by_digest(entries);
        Self::from_groups(&groups, algorithm)
    }

    /// Build a manifest from precomputed groups
    pub fn from_groups(groups: &[DigestGroup], algorithm: HashAlgorithm) -> Self {
        let mut mapping = BTreeMap::new();
        let mut canonical_files = BTreeMap::new();

        for group in groups {
            canonical_files.insert(group.digest.clone(), group.canonical.clone());
            for name in &group.members {
                mapping.insert(name.clone(), group.canonical.clone());
            }
        }

        Self {
            version: MANIFEST_VERSION,
            algorithm,
            mapping,
            canonical_files,
            stats: compute_stats(groups),
        }
    }

    /// Canonical name for `name`, a single lookup
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.mapping.get(name).map(String::as_str)
    }

    /// Names that are stored physically
    pub fn canonical_names(&self) -> impl Iterator<Item = &str> {
        self.canonical_files.values().map(String::as_str)
    }

    /// Digest stored for a canonical name
    pub fn digest_of(&self, canonical: &str) -> Option<&str> {
        self.canonical_files
            .iter()
            .find(|(_, name)| name.as_str() == canonical)
            .map(|(digest, _)| digest.as_str())
    }

    /// Original names grouped under their canonical name
    pub fn aliases(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut aliases: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, canonical) in &self.mapping {
            aliases
                .entry(canonical.as_str())
                .or_default()
                .push(name.as_str());
        }
        aliases
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

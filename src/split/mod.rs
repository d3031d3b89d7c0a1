// src/split/mod.rs

//! Split oversized artifacts into numbered parts and join them back
//!
//! Parts are named `<artifact>.part1`, `<artifact>.part2`, ... with no gaps.
//! Alongside them the splitter writes `<artifact>.parts.json`, recording
//! every part's offset, length and SHA-256 plus the digest of the whole
//! artifact, and `<artifact>.join`, a shell helper that concatenates them.

mod joiner;
mod splitter;

pub use joiner::{JoinOutcome, join_parts};
pub use splitter::{SplitOutcome, split_artifact};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Suffix of the parts record
pub const PARTS_RECORD_SUFFIX: &str = ".parts.json";

/// Suffix of the join helper script
pub const JOIN_SCRIPT_SUFFIX: &str = ".join";

/// One part of a split artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    /// 1-based position
    pub index: usize,
    pub file_name: String,
    /// Byte offset within the artifact
    pub offset: u64,
    pub length: u64,
    pub sha256: String,
}

/// Everything needed to check a reassembled artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartsRecord {
    /// Original artifact file name
    pub artifact: String,
    pub size: u64,
    pub sha256: String,
    pub part_size: u64,
    pub parts: Vec<PartRecord>,
}

impl PartsRecord {
    /// Record path for an artifact name inside `dir`
    pub fn path_for(dir: &Path, artifact: &str) -> PathBuf {
        dir.join(format!("{}{}", artifact, PARTS_RECORD_SUFFIX))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        crate::checksum::write_atomic(path, json.as_bytes())
    }
}

/// `<artifact>.part<index>`
pub fn part_file_name(artifact: &str, index: usize) -> String {
    format!("{}.part{}", artifact, index)
}

/// Split a part path into its artifact name and index
///
/// ```
/// use toolpack::split::parse_part_name;
/// use std::path::Path;
///
/// let (base, index) = parse_part_name(Path::new("out/llvm.tar.zst.part12")).unwrap();
/// assert_eq!(base, "llvm.tar.zst");
/// assert_eq!(index, 12);
/// assert!(parse_part_name(Path::new("llvm.tar.zst")).is_err());
/// ```
pub fn parse_part_name(path: &Path) -> Result<(String, usize)> {
    let invalid = || Error::InvalidPartName(path.to_path_buf());
    let name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let (base, index) = name.rsplit_once(".part").ok_or_else(invalid)?;
    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let index: usize = index.parse().map_err(|_| invalid())?;
    if index == 0 {
        return Err(invalid());
    }
    Ok((base.to_string(), index))
}

/// POSIX shell helper that reassembles `artifact` from its parts
pub fn join_script(artifact: &str, parts: &[String]) -> String {
    let quoted: Vec<String> = parts.iter().map(|p| shell_quote(p)).collect();
    format!(
        "#!/bin/sh\n\
         # Reassemble {artifact} from {count} parts\n\
         set -e\n\
         cd \"$(dirname \"$0\")\"\n\
         cat {parts} > {target}\n\
         echo \"Created {artifact}\"\n",
        artifact = artifact,
        count = parts.len(),
        parts = quoted.join(" "),
        target = shell_quote(artifact),
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

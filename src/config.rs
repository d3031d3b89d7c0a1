// src/config.rs
//! Packaging configuration
//!
//! A `PackConfig` is built once (defaults, optionally overlaid by a TOML
//! file, then by CLI flags) and passed by reference into every stage.
//!
//! ```toml
//! jobs = 8
//!
//! [hash]
//! algorithm = "sha256"
//! block_size = 8192
//!
//! [compression]
//! level = 22
//! threads = 4
//!
//! [checksum]
//! algorithms = ["sha256", "md5"]
//!
//! [split]
//! max_size_mb = 99
//!
//! [policy]
//! default_mode = "644"
//!
//! [[policy.rules]]
//! pattern = "**/bin/**"
//! mode = "755"
//! ```

use crate::archive::policy::{PermissionPolicy, PolicyRule, parse_mode};
use crate::error::{Error, Result};
use crate::hash::{DEFAULT_BLOCK_SIZE, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Highest zstd level
pub const MAX_COMPRESSION_LEVEL: i32 = 22;

/// Read/write chunk for streaming compression and splitting
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Size ceiling for a single published artifact
pub const DEFAULT_MAX_SIZE_MB: u64 = 99;

const MIB: u64 = 1024 * 1024;

/// Complete packaging configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Worker threads for per-file stages (0 = available parallelism)
    pub jobs: usize,

    pub hash: HashSection,

    pub compression: CompressionSection,

    pub checksum: ChecksumSection,

    pub split: SplitSection,

    pub policy: PolicySection,
}

/// Content hashing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashSection {
    /// Digest used for deduplication identity
    pub algorithm: HashAlgorithm,

    /// Streaming read block in bytes
    pub block_size: usize,
}

impl Default for HashSection {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha256,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

/// zstd settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSection {
    /// zstd level, 1..=22
    pub level: i32,

    /// zstd worker threads (0 = single-threaded)
    pub threads: u32,

    /// Bytes fed to the encoder per chunk
    pub chunk_size: usize,
}

impl Default for CompressionSection {
    fn default() -> Self {
        Self {
            level: MAX_COMPRESSION_LEVEL,
            threads: default_threads(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

fn default_threads() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(0)
}

/// Sidecar settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumSection {
    /// One sidecar is written per algorithm
    pub algorithms: Vec<HashAlgorithm>,
}

impl Default for ChecksumSection {
    fn default() -> Self {
        Self {
            algorithms: vec![HashAlgorithm::Sha256, HashAlgorithm::Md5],
        }
    }
}

/// Part splitting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSection {
    /// Artifacts larger than this are split
    pub max_size_mb: u64,
}

impl Default for SplitSection {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
        }
    }
}

impl SplitSection {
    /// Ceiling in bytes above which an artifact is split
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(MIB)
    }

    /// Part size in bytes, one MiB below the ceiling
    pub fn part_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_sub(1).max(1).saturating_mul(MIB)
    }
}

/// Permission policy as written in TOML
///
/// With no rules the toolchain policy is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Octal mode for unmatched files
    pub default_mode: String,

    pub rules: Vec<PolicyRuleSection>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            default_mode: "644".to_string(),
            rules: Vec::new(),
        }
    }
}

/// One `[[policy.rules]]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRuleSection {
    pub pattern: String,
    pub mode: String,
}

impl PackConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: PackConfig = toml::from_str(&content).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_COMPRESSION_LEVEL).contains(&self.compression.level) {
            return Err(Error::InvalidConfig(format!(
                "compression.level must be between 1 and {}, got {}",
                MAX_COMPRESSION_LEVEL, self.compression.level
            )));
        }
        if self.compression.chunk_size == 0 {
            return Err(Error::InvalidConfig(
                "compression.chunk_size must be positive".to_string(),
            ));
        }
        if self.hash.block_size == 0 {
            return Err(Error::InvalidConfig(
                "hash.block_size must be positive".to_string(),
            ));
        }
        if !(2..=u64::MAX / MIB).contains(&self.split.max_size_mb) {
            return Err(Error::InvalidConfig(format!(
                "split.max_size_mb must be between 2 and {}, got {}",
                u64::MAX / MIB,
                self.split.max_size_mb
            )));
        }
        self.permission_policy()?;
        Ok(())
    }

    /// Effective worker count
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            self.jobs
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Build a rayon pool sized by `jobs`
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.effective_jobs())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("cannot start worker pool: {}", e)))
    }

    /// Compile the configured permission policy
    pub fn permission_policy(&self) -> Result<PermissionPolicy> {
        if self.policy.rules.is_empty() {
            return Ok(PermissionPolicy::toolchain());
        }

        let rules = self
            .policy
            .rules
            .iter()
            .map(|rule| PolicyRule::new(&rule.pattern, parse_mode(&rule.mode)?))
            .collect::<Result<Vec<_>>>()?;

        Ok(PermissionPolicy::new(
            rules,
            parse_mode(&self.policy.default_mode)?,
        ))
    }
}

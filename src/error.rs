// src/error.rs

//! Crate-wide error type
//!
//! Every variant that can be traced back to a file carries the offending path,
//! so a fatal error is reproducible from its message alone.

use crate::hash::{HashAlgorithm, HashError};
use crate::pipeline::Stage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the packaging engine
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on a specific path
    #[error("I/O error on {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Manifest file does not exist
    #[error("Deduplication manifest not found: {}", .0.display())]
    ManifestMissing(PathBuf),

    /// Manifest exists but cannot be used
    #[error("Invalid deduplication manifest {}: {reason}", path.display())]
    InvalidManifest { path: PathBuf, reason: String },

    /// Manifest serialization failure
    #[error("Manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Canonical file referenced by the manifest is absent from the store
    #[error("Canonical file '{name}' missing from store: {}", path.display())]
    CanonicalMissing { name: String, path: PathBuf },

    /// Path escapes its root
    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    /// Path is malformed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Hash parse failure
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Permission policy rule could not be compiled
    #[error("Invalid permission rule '{pattern}': {reason}")]
    InvalidPolicy { pattern: String, reason: String },

    /// Archive entries whose stored mode disagrees with the policy
    #[error("{count} entries in {} violate the permission policy: {summary}", archive.display())]
    PermissionViolations {
        archive: PathBuf,
        count: usize,
        summary: String,
    },

    /// Compression codec failure or misconfiguration
    #[error("Compression codec error: {reason}")]
    Codec { reason: String },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration {}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Refusing to split a zero-length artifact
    #[error("Artifact is empty: {}", .0.display())]
    EmptyArtifact(PathBuf),

    /// Part sequence has a gap
    #[error("Missing part {index} of {base}")]
    MissingPart { base: String, index: usize },

    /// More parts given than the parts record lists
    #[error("Unexpected part {}: {base} was split into {count} parts", path.display())]
    UnexpectedPart {
        path: PathBuf,
        base: String,
        count: usize,
    },

    /// File name does not follow `<name>.part<N>`
    #[error("Not a part file: {}", .0.display())]
    InvalidPartName(PathBuf),

    /// Parts passed to the joiner belong to different artifacts
    #[error("Part {} does not belong to {expected}", found.display())]
    MixedParts { expected: String, found: PathBuf },

    /// Byte count disagrees with the recorded length
    #[error("Length mismatch for {}: expected {expected} bytes, got {actual}", path.display())]
    LengthMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Digest disagrees with the recorded digest
    #[error("{algorithm} mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    /// Checksum sidecar is malformed
    #[error("Invalid checksum file {}: {reason}", path.display())]
    InvalidSidecar { path: PathBuf, reason: String },

    /// Expanded layout does not match the manifest
    #[error("Expansion of {} incomplete: expected {expected} entries, found {actual}", dir.display())]
    ExpansionIncomplete {
        dir: PathBuf,
        expected: usize,
        actual: usize,
    },

    /// Operation was cancelled between units of work
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Failure attributed to a pipeline stage
    #[error("{stage} stage failed")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Attribute this error to a pipeline stage
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            // Keep the innermost stage
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

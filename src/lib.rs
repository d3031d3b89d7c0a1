// src/lib.rs

//! Toolpack: deduplicating packager for prebuilt toolchain binaries
//!
//! Takes a directory of named binaries and produces a deduplicated,
//! permission-correct, compressed and checksummed archive plus a manifest.
//!
//! # Architecture
//!
//! - Content identity: files are grouped by digest, one canonical copy each
//! - Manifest: every original name maps to its canonical file, persisted as JSON
//! - Expansion: the full name set is rebuilt with hard links (copies as fallback)
//! - Packaging: tar modes come from a declarative policy, never from disk
//! - Distribution: zstd, checksum sidecars, and numbered parts under a size ceiling

pub mod archive;
pub mod checksum;
pub mod compression;
pub mod config;
pub mod dedup;
mod error;
pub mod filesystem;
pub mod hash;
pub mod options;
pub mod pipeline;
pub mod progress;
pub mod split;

pub use config::PackConfig;
pub use dedup::{DedupStats, DeduplicationManifest, analyze, dedup_directory};
pub use error::{Error, Result};
pub use hash::{ContentHash, HashAlgorithm, Hasher};
pub use options::RunOptions;
pub use pipeline::{PackagePipeline, PipelineOutcome, Stage};
pub use progress::{CliProgress, LogProgress, ProgressStyle, ProgressTracker, SilentProgress};

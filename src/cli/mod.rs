// src/cli/mod.rs
//! CLI definitions for toolpack
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use toolpack::HashAlgorithm;

#[derive(Parser)]
#[command(name = "toolpack")]
#[command(version)]
#[command(about = "Deduplicate, package and split prebuilt toolchain binaries", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command
#[derive(Args)]
pub struct GlobalArgs {
    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Worker threads for per-file stages (default: all cores)
    #[arg(short, long, global = true, value_name = "N")]
    pub jobs: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a manifest and canonical store from a binary directory
    Dedup {
        /// Directory of binaries (one level, not recursive)
        source: PathBuf,

        /// Output directory for the manifest and canonical files
        dest: PathBuf,

        /// Only consider file names matching this glob
        #[arg(short, long)]
        pattern: Option<String>,

        /// Content hash used for identity
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
    },

    /// Rebuild every original file name from a deduplicated directory
    Expand {
        /// Directory written by `dedup`
        deduped: PathBuf,

        /// Directory to populate
        output: PathBuf,

        /// Re-hash every expanded file
        #[arg(long)]
        verify: bool,
    },

    /// Report duplicate statistics without writing anything
    Analyze {
        /// Directory of binaries
        dir: PathBuf,

        /// Only consider file names matching this glob
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Run the full pipeline: dedup, expand, tar, verify, compress, checksum, split
    Package {
        /// Directory of binaries
        binary_dir: PathBuf,

        /// Where the artifact, sidecars and parts are written
        output_dir: PathBuf,

        /// Archive name; also the root directory inside the archive
        #[arg(short, long)]
        name: String,

        /// Extra tree packaged under `<name>/lib`
        #[arg(long)]
        lib_dir: Option<PathBuf>,

        /// zstd level (1-22)
        #[arg(long)]
        level: Option<i32>,

        /// zstd worker threads (0 = single-threaded)
        #[arg(long)]
        threads: Option<u32>,

        /// Split artifacts larger than this many MB
        #[arg(long)]
        max_size_mb: Option<u64>,

        /// Keep the work directory
        #[arg(long)]
        keep_intermediate: bool,
    },

    /// Check archive permissions against the policy
    Verify {
        /// Tar archive (compressed archives are decoded)
        archive: PathBuf,
    },

    /// Unpack an archive
    Extract {
        /// Archive (.tar, .tar.zst, .tar.gz, .tar.xz)
        archive: PathBuf,

        /// Destination directory
        output: PathBuf,

        /// Write hard-linked names as independent files
        #[arg(long)]
        break_hardlinks: bool,
    },

    /// Split a file into numbered parts
    Split {
        /// File to split; removed once the parts are written
        file: PathBuf,

        /// Part size in MB
        #[arg(long, value_name = "MB")]
        part_size: u64,

        /// Directory for the parts (default: next to the file)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Join numbered parts back into one file
    Join {
        /// Part files, in any order, followed by the output path
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,
    },

    /// Check an artifact against its checksum sidecar
    VerifyChecksum {
        /// `.sha256` or `.md5` sidecar file
        sidecar: PathBuf,
    },
}

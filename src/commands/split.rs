// src/commands/split.rs

//! Part commands: split, join, verify-checksum

use super::format_mb;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use toolpack::checksum::verify_sidecar;
use toolpack::split::{join_parts, split_artifact};
use toolpack::{PackConfig, RunOptions};

const MIB: u64 = 1024 * 1024;

/// Split a file into `part_size_mb` MB parts
pub fn cmd_split(
    file: &Path,
    part_size_mb: u64,
    output_dir: Option<&Path>,
    options: &RunOptions,
) -> Result<()> {
    if part_size_mb == 0 {
        bail!("--part-size must be at least 1 MB");
    }
    let part_size = part_size_mb
        .checked_mul(MIB)
        .context("--part-size is too large")?;

    let outcome = split_artifact(file, part_size, output_dir, options)
        .with_context(|| format!("Failed to split {}", file.display()))?;

    println!(
        "Split {} ({}) into {} parts:",
        outcome.record.artifact,
        format_mb(outcome.record.size),
        outcome.parts.len()
    );
    for part in &outcome.record.parts {
        println!("  {}  {} ({})", part.sha256, part.file_name, format_mb(part.length));
    }
    println!("Parts record: {}", outcome.record_path.display());
    println!("Rejoin with:  {}", outcome.join_script.display());
    Ok(())
}

/// Join parts; the last path is the output
pub fn cmd_join(paths: &[PathBuf], options: &RunOptions) -> Result<()> {
    let Some((output, parts)) = paths.split_last() else {
        bail!("join needs at least one part and an output path");
    };
    if parts.is_empty() {
        bail!("join needs at least one part and an output path");
    }

    let outcome = join_parts(parts, output, options)
        .with_context(|| format!("Failed to join parts into {}", output.display()))?;

    println!(
        "Joined {} parts into {} ({})",
        parts.len(),
        output.display(),
        format_mb(outcome.bytes)
    );
    println!("  sha256: {}", outcome.sha256);
    if !outcome.verified {
        println!("  (no parts record found; digests not checked)");
    }
    Ok(())
}

/// Re-hash the artifact named by a sidecar
pub fn cmd_verify_checksum(sidecar: &Path, config: &PackConfig) -> Result<()> {
    let checked = verify_sidecar(sidecar, config.hash.block_size)?;
    println!(
        "{}: OK ({} {})",
        checked.file_name, checked.digest.algorithm, checked.digest
    );
    Ok(())
}

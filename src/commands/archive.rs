// src/commands/archive.rs

//! Archive commands: package, verify, extract

use super::format_mb;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use toolpack::archive::{extract_archive, verify_archive};
use toolpack::{PackConfig, PackagePipeline, RunOptions};

/// Flags of the `package` command
pub struct PackageArgs {
    pub binary_dir: PathBuf,
    pub output_dir: PathBuf,
    pub name: String,
    pub lib_dir: Option<PathBuf>,
    pub level: Option<i32>,
    pub threads: Option<u32>,
    pub max_size_mb: Option<u64>,
    pub keep_intermediate: bool,
}

/// Run the full packaging pipeline
pub fn cmd_package(args: PackageArgs, config: &PackConfig, options: &RunOptions) -> Result<()> {
    let mut config = config.clone();
    if let Some(level) = args.level {
        config.compression.level = level;
    }
    if let Some(threads) = args.threads {
        config.compression.threads = threads;
    }
    if let Some(max_size_mb) = args.max_size_mb {
        config.split.max_size_mb = max_size_mb;
    }

    let mut pipeline =
        PackagePipeline::new(&config, &args.name)?.keep_intermediate(args.keep_intermediate);
    if let Some(lib_dir) = &args.lib_dir {
        pipeline = pipeline.with_lib_dir(lib_dir);
    }

    let outcome = pipeline
        .run(&args.binary_dir, &args.output_dir, options)
        .with_context(|| format!("Failed to package {}", args.name))?;
    let stats = &outcome.manifest.stats;

    println!("Packaged {}", args.name);
    println!(
        "  Binaries:    {} ({} canonical, {} saved)",
        outcome.manifest.len(),
        outcome.manifest.canonical_files.len(),
        format_mb(stats.savings)
    );
    println!(
        "  Archive:     {} entries, {} hard links",
        outcome.package.files + outcome.package.hardlinks + outcome.package.symlinks,
        outcome.package.hardlinks
    );
    println!(
        "  Compressed:  {} -> {} ({:.1}%)",
        format_mb(outcome.compression.input_size),
        format_mb(outcome.compression.output_size),
        outcome.compression.ratio_percent()
    );
    for sidecar in &outcome.sidecars {
        println!("  {:<12} {}", format!("{}:", sidecar.digest.algorithm), sidecar.digest);
    }
    if let Some(split) = &outcome.split {
        println!("  Split into {} parts:", split.parts.len());
        for part in &split.record.parts {
            println!("    {} ({})", part.file_name, format_mb(part.length));
        }
        println!("  Rejoin with: {}", split.join_script.display());
    }
    println!("Output:");
    for file in outcome.published_files() {
        println!("  {}", file.display());
    }
    if let Some(work_dir) = &outcome.work_dir {
        println!("Intermediates kept in {}", work_dir.display());
    }
    Ok(())
}

/// Check every entry's mode against the policy
pub fn cmd_verify(archive: &Path, config: &PackConfig) -> Result<()> {
    let policy = config.permission_policy()?;
    let report = verify_archive(archive, &policy)?;
    println!(
        "{}: {} entries match the permission policy",
        archive.display(),
        report.checked
    );
    Ok(())
}

/// Unpack an archive
pub fn cmd_extract(
    archive: &Path,
    output: &Path,
    break_hardlinks: bool,
    options: &RunOptions,
) -> Result<()> {
    let report = extract_archive(archive, output, break_hardlinks, options)
        .with_context(|| format!("Failed to extract {}", archive.display()))?;
    println!("Extracted {} into {}", archive.display(), output.display());
    println!("  Files:       {}", report.files);
    println!("  Hard links:  {}", report.hardlinks);
    println!("  Symlinks:    {}", report.symlinks);
    println!("  Directories: {}", report.directories);
    Ok(())
}

// src/commands/dedup.rs

//! Deduplication commands: dedup, expand, analyze

use super::format_mb;
use anyhow::{Context, Result};
use glob::Pattern;
use std::path::Path;
use tracing::info;

use toolpack::dedup::{CanonicalStore, ManifestStore};
use toolpack::filesystem::{StructureExpander, link_report};
use toolpack::{HashAlgorithm, PackConfig, RunOptions};

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Pattern>> {
    pattern
        .map(|p| Pattern::new(p).with_context(|| format!("Invalid pattern '{}'", p)))
        .transpose()
}

/// Build a manifest and canonical store
pub fn cmd_dedup(
    source: &Path,
    dest: &Path,
    pattern: Option<&str>,
    algorithm: Option<HashAlgorithm>,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<()> {
    let pattern = compile_pattern(pattern)?;
    let mut config = config.clone();
    if let Some(algorithm) = algorithm {
        config.hash.algorithm = algorithm;
    }

    let outcome = toolpack::dedup_directory(source, dest, pattern.as_ref(), &config, options)
        .with_context(|| format!("Failed to deduplicate {}", source.display()))?;
    let stats = &outcome.manifest.stats;

    println!("Deduplicated {}", source.display());
    println!("  Files:           {}", outcome.manifest.len());
    println!("  Canonical files: {}", outcome.manifest.canonical_files.len());
    println!("  Duplicates:      {}", stats.duplicate_count);
    println!("  Original size:   {}", format_mb(stats.total_size));
    println!("  Deduped size:    {}", format_mb(stats.deduped_size));
    println!(
        "  Savings:         {} ({:.1}%)",
        format_mb(stats.savings),
        stats.savings_percent
    );
    println!("  Manifest:        {}", outcome.manifest_path.display());
    Ok(())
}

/// Rebuild the original names from a deduplicated directory
pub fn cmd_expand(
    deduped: &Path,
    output: &Path,
    verify: bool,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<()> {
    let store = ManifestStore::new(deduped);
    let manifest = store.load()?;
    let canonical = CanonicalStore::open(store.canonical_dir())?;
    info!(
        "Loaded manifest with {} files ({} canonical)",
        manifest.len(),
        manifest.canonical_files.len()
    );

    let report = StructureExpander::new(&manifest, &canonical)
        .with_verify(verify)
        .expand(output, config, options)
        .with_context(|| format!("Failed to expand into {}", output.display()))?;

    println!("Expanded {} files into {}", report.files, output.display());
    println!("  Copied:      {}", report.copied);
    println!("  Hard links:  {}", report.hardlinked);
    if report.fallback_copies > 0 {
        println!("  Fallback copies: {}", report.fallback_copies);
    }

    let links = link_report(output)?;
    println!(
        "  Inodes:      {} unique for {} files",
        links.unique_inodes, links.total_files
    );
    for group in &links.hardlink_groups {
        println!("    {}", group.join(" = "));
    }
    Ok(())
}

/// Print duplicate groups without writing anything
pub fn cmd_analyze(
    dir: &Path,
    pattern: Option<&str>,
    config: &PackConfig,
    options: &RunOptions,
) -> Result<()> {
    let pattern = compile_pattern(pattern)?;
    let analysis = toolpack::analyze(dir, pattern.as_ref(), config, options)
        .with_context(|| format!("Failed to analyze {}", dir.display()))?;
    let stats = &analysis.stats;

    println!("Analysis of {}", dir.display());
    println!(
        "  Files: {} ({} unique contents)",
        analysis.groups.iter().map(|g| g.members.len()).sum::<usize>(),
        analysis.groups.len()
    );
    println!("  Total size:   {}", format_mb(stats.total_size));
    println!("  Deduped size: {}", format_mb(stats.deduped_size));
    println!(
        "  Savings:      {} ({:.1}%)",
        format_mb(stats.savings),
        stats.savings_percent
    );

    let duplicates: Vec<_> = analysis.duplicate_groups().collect();
    if duplicates.is_empty() {
        println!("\nNo duplicates found.");
        return Ok(());
    }

    println!("\nDuplicate groups ({}):", duplicates.len());
    for group in duplicates {
        println!(
            "  {} ({} each, {} wasted)",
            &group.digest[..group.digest.len().min(16)],
            format_mb(group.size),
            format_mb(group.wasted_bytes())
        );
        for member in &group.members {
            let marker = if *member == group.canonical { "*" } else { " " };
            println!("    {} {}", marker, member);
        }
    }
    println!("\n(* = canonical)");
    Ok(())
}

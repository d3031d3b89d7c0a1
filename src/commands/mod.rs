// src/commands/mod.rs
//! Command handlers for the toolpack CLI

mod archive;
mod dedup;
mod split;

pub use archive::{cmd_extract, cmd_package, cmd_verify, PackageArgs};
pub use dedup::{cmd_analyze, cmd_dedup, cmd_expand};
pub use split::{cmd_join, cmd_split, cmd_verify_checksum};

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use std::sync::Arc;
use toolpack::{CliProgress, PackConfig, ProgressStyle, RunOptions};

const MB: f64 = 1024.0 * 1024.0;

/// Build the configuration: defaults, then `--config`, then flags
pub fn load_config(global: &GlobalArgs) -> Result<PackConfig> {
    let mut config = match &global.config {
        Some(path) => PackConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PackConfig::default(),
    };
    if let Some(jobs) = global.jobs {
        config.jobs = jobs;
    }
    Ok(config)
}

/// Run options with a terminal progress bar unless quiet
pub fn run_options(global: &GlobalArgs, style: ProgressStyle) -> RunOptions {
    if global.quiet {
        RunOptions::new()
    } else {
        RunOptions::new().with_progress(Arc::new(CliProgress::new(style)))
    }
}

/// Bytes as megabytes with two decimals
pub fn format_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / MB)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mb() {
        assert_eq!(format_mb(0), "0.00 MB");
        assert_eq!(format_mb(3 * 1024 * 1024 / 2), "1.50 MB");
    }
}

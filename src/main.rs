// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, GlobalArgs};
use toolpack::ProgressStyle;

fn init_tracing(global: &GlobalArgs) {
    let default_level = if global.verbose {
        "debug"
    } else if global.quiet {
        "warn"
    } else {
        "info"
    };

    // RUST_LOG wins over the flags
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let global = cli.global;
    let config = commands::load_config(&global)?;

    match cli.command {
        Commands::Dedup {
            source,
            dest,
            pattern,
            algorithm,
        } => {
            let options = commands::run_options(&global, ProgressStyle::Bar);
            commands::cmd_dedup(
                &source,
                &dest,
                pattern.as_deref(),
                algorithm,
                &config,
                &options,
            )
        }
        Commands::Expand {
            deduped,
            output,
            verify,
        } => {
            let options = commands::run_options(&global, ProgressStyle::Bar);
            commands::cmd_expand(&deduped, &output, verify, &config, &options)
        }
        Commands::Analyze { dir, pattern } => {
            let options = commands::run_options(&global, ProgressStyle::Bar);
            commands::cmd_analyze(&dir, pattern.as_deref(), &config, &options)
        }
        Commands::Package {
            binary_dir,
            output_dir,
            name,
            lib_dir,
            level,
            threads,
            max_size_mb,
            keep_intermediate,
        } => {
            let options = commands::run_options(&global, ProgressStyle::Bytes);
            commands::cmd_package(
                commands::PackageArgs {
                    binary_dir,
                    output_dir,
                    name,
                    lib_dir,
                    level,
                    threads,
                    max_size_mb,
                    keep_intermediate,
                },
                &config,
                &options,
            )
        }
        Commands::Verify { archive } => commands::cmd_verify(&archive, &config),
        Commands::Extract {
            archive,
            output,
            break_hardlinks,
        } => {
            let options = commands::run_options(&global, ProgressStyle::Spinner);
            commands::cmd_extract(&archive, &output, break_hardlinks, &options)
        }
        Commands::Split {
            file,
            part_size,
            output_dir,
        } => {
            let options = commands::run_options(&global, ProgressStyle::Bytes);
            commands::cmd_split(&file, part_size, output_dir.as_deref(), &options)
        }
        Commands::Join { paths } => {
            let options = commands::run_options(&global, ProgressStyle::Bytes);
            commands::cmd_join(&paths, &options)
        }
        Commands::VerifyChecksum { sidecar } => commands::cmd_verify_checksum(&sidecar, &config),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.global);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

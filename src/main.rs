//! mediacarve - Signature-based media carver
//!
//! Scans a raw image for JPEG, PNG, WAV and MP4 signatures and writes every
//! file it can delimit to `<output>/Photos`, `<output>/Videos` and
//! `<output>/Audio`.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mediacarve::carve::report::{self, MANIFEST_FILE};
use mediacarve::cli::{Cli, ReportFormat};
use mediacarve::{CarveProgress, Carver, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.init_config {
        let path = cli.config_path();
        if Config::write_sample(&path)? {
            println!("{} Sample config written: {}", "✓".green(), path.display());
        } else {
            println!("{} Config already exists: {}", "!".yellow(), path.display());
        }
        return Ok(());
    }

    let mut config = match cli.config {
        Some(ref path) if cli.save_config && !path.exists() => Config::default(),
        Some(ref path) => Config::load_from(path)?,
        None => Config::load(),
    };
    cli.apply_to(&mut config);

    if cli.save_config {
        let path = cli.config_path();
        config.save_to(&path)?;
        println!("{} Config saved: {}", "✓".green(), path.display());
        if cli.source.is_none() {
            return Ok(());
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive(format!("mediacarve={}", config.general.log_level).parse()?),
        )
        .init();

    let Some(source) = cli.source.clone() else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let options = config.carve_options(source);
    let carver = Carver::new(options);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}",
            )?
            .progress_chars("█▓▒░"),
    );
    if cli.report == ReportFormat::Json {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let (artifacts, summary) = carver.carve_with_progress(|progress| match progress {
        CarveProgress::Scanning {
            bytes_scanned,
            total_bytes,
        } => {
            pb.set_length(total_bytes);
            pb.set_position(bytes_scanned);
        }
        CarveProgress::Recovered(artifact) => {
            pb.set_message(format!("{} {}", artifact.kind, artifact.sequence));
            if cli.verbose {
                pb.println(report::format_artifact(&artifact));
            }
        }
        CarveProgress::Done => pb.finish_and_clear(),
    })?;

    let options = carver.options();
    if config.carve.write_manifest {
        let manifest = report::build_manifest(options, &artifacts, &summary);
        let path = options.output_root.join(MANIFEST_FILE);
        report::save_manifest(&manifest, &path)
            .with_context(|| format!("Failed to save manifest for {}", options.source.display()))?;
        if cli.report == ReportFormat::Human {
            println!("  {} Manifest saved: {}", "✓".green(), path.display());
        }
    }

    match cli.report {
        ReportFormat::Human => print!("{}", report::format_summary(&summary, options.dry_run)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
    }

    Ok(())
}

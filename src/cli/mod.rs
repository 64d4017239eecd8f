//! CLI module - Command line interface definitions

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::carve::MediaKind;
use crate::config::Config;

/// mediacarve - Recover JPEG, PNG, WAV and MP4 files from raw images
///
/// Scans a disk image, memory dump or damaged container byte by byte for
/// media signatures and carves out every file it can delimit. The source is
/// only ever read.
#[derive(Parser, Debug)]
#[command(name = "mediacarve")]
#[command(version)]
#[command(about = "Signature-based media carver for raw images", long_about = None)]
pub struct Cli {
    /// Source to scan - disk image, block device or memory dump
    pub source: Option<PathBuf>,

    /// Root directory for recovered files (default: dump)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Config file (default: platform config dir)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Pause after a RIFF/ftyp signature that isn't WAV/MP4, in milliseconds
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Read-ahead window in bytes
    #[arg(long)]
    pub window_size: Option<usize>,

    /// Only carve these kinds
    #[arg(long, value_enum, value_delimiter = ',')]
    pub only: Option<Vec<KindFilter>>,

    /// Dry run - scan and report without extracting
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Write manifest.json under the output root
    #[arg(long, short)]
    pub manifest: bool,

    /// Summary format
    #[arg(long, value_enum, default_value = "human")]
    pub report: ReportFormat,

    /// Verbose output
    #[arg(long, short)]
    pub verbose: bool,

    /// Write a commented sample config (to --config or the default path) and exit
    #[arg(long)]
    pub init_config: bool,

    /// Save the effective settings, overrides included, as the config file
    #[arg(long, conflicts_with = "init_config")]
    pub save_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary
    Human,
    /// JSON output
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindFilter {
    /// JPEG images
    Jpeg,
    /// PNG images
    Png,
    /// RIFF/WAVE audio
    Wav,
    /// ISO-BMFF / MP4 video and audio
    Mp4,
}

impl From<KindFilter> for MediaKind {
    fn from(filter: KindFilter) -> Self {
        match filter {
            KindFilter::Jpeg => MediaKind::Jpeg,
            KindFilter::Png => MediaKind::Png,
            KindFilter::Wav => MediaKind::Wav,
            KindFilter::Mp4 => MediaKind::Mp4,
        }
    }
}

impl Cli {
    /// Config file this invocation reads (and `--init-config`/`--save-config` write)
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Apply command-line overrides on top of file configuration
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(ref output) = self.output {
            config.carve.output_root = output.clone();
        }
        if let Some(ms) = self.backoff_ms {
            config.carve.mismatch_backoff_ms = ms;
        }
        if let Some(size) = self.window_size {
            config.carve.window_size = size;
        }
        if let Some(ref only) = self.only {
            config.formats.enabled = only.iter().copied().map(MediaKind::from).collect();
        }
        if self.dry_run {
            config.carve.dry_run = true;
        }
        if self.manifest {
            config.carve.write_manifest = true;
        }
        if self.verbose {
            config.general.log_level = "debug".to_string();
        }
    }
}

//! Carve reports - JSON manifest of recovered artifacts and console summaries.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};

use super::{Artifact, CarveOptions, CarveSummary, MediaKind};

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// File name of the manifest under the output root
pub const MANIFEST_FILE: &str = "manifest.json";

/// Record of one carve run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub tool: String,
    pub tool_version: String,
    pub created_at: DateTime<Utc>,
    /// Scanned image, device or dump
    pub source: String,
    pub output_root: String,
    pub dry_run: bool,
    pub summary: CarveSummary,
    pub artifacts: Vec<Artifact>,
}

pub fn build_manifest(
    options: &CarveOptions,
    artifacts: &[Artifact],
    summary: &CarveSummary,
) -> Manifest {
    Manifest {
        version: MANIFEST_VERSION,
        tool: env!("CARGO_PKG_NAME").to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        created_at: Utc::now(),
        source: options.source.to_string_lossy().to_string(),
        output_root: options.output_root.to_string_lossy().to_string(),
        dry_run: options.dry_run,
        summary: summary.clone(),
        artifacts: artifacts.to_vec(),
    }
}

/// Save a manifest to disk
pub fn save_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(manifest).context("Failed to serialize carve manifest")?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, json)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;

    tracing::info!(path = %path.display(), artifacts = manifest.artifacts.len(), "Manifest written");
    Ok(())
}

/// Load a manifest from disk
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest from {}", path.display()))?;

    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse manifest from {}", path.display()))
}

/// Format a CarveSummary for human display
pub fn format_summary(summary: &CarveSummary, dry_run: bool) -> String {
    let mut out = String::new();

    out.push_str(&format!("\n  {}\n", "Carve Summary".bright_white().bold()));
    out.push_str("  ==========================================\n\n");

    if dry_run {
        out.push_str(&format!("  {}\n\n", "DRY RUN (nothing written)".yellow()));
    }

    for kind in MediaKind::ALL {
        out.push_str(&format!("  {:<18}{}\n", kind.label(), summary.count(kind)));
    }
    out.push('\n');

    out.push_str(&format!("  Recovered:      {}\n", summary.artifacts));
    out.push_str(&format!("  Partial:        {}\n", summary.partial));
    out.push_str(&format!("  Failed:         {}\n", summary.failed));
    out.push_str(&format!(
        "  Extracted:      {}\n",
        humansize::format_size(summary.bytes_extracted, humansize::BINARY)
    ));
    out.push_str(&format!(
        "  Source size:    {}\n",
        humansize::format_size(summary.source_size, humansize::BINARY)
    ));
    out.push_str(&format!("  Duration:       {} ms\n", summary.duration_ms));

    if summary.failed > 0 {
        out.push_str(&format!(
            "\n  {}\n",
            format!("{} artifact(s) could not be written", summary.failed).red()
        ));
    }

    out
}

/// One line per artifact, for `--verbose` listings
pub fn format_artifact(artifact: &Artifact) -> String {
    let status = if artifact.partial {
        "partial".yellow().to_string()
    } else {
        "complete".green().to_string()
    };
    format!(
        "  {:>12x}..{:<12x} {:>10}  {}  {}",
        artifact.start,
        artifact.end,
        humansize::format_size(artifact.size, humansize::BINARY),
        artifact.path.display(),
        status
    )
}

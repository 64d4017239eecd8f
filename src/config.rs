//! Configuration Module - User preferences from config.toml
//!
//! Supports:
//! - Log level
//! - Output root, read-ahead window and mismatch backoff for carving
//! - Which media kinds to carve
//! - Extra WAV chunk tags, MP4 atom types and MP4 brands

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::carve::{CarveOptions, FormatTables, MediaKind};
use crate::source::DEFAULT_WINDOW_SIZE;

/// mediacarve configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,
    /// Carving settings
    pub carve: CarveConfig,
    /// Format tables
    pub formats: FormatsConfig,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Carving settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarveConfig {
    /// Root for Photos/Videos/Audio
    pub output_root: PathBuf,
    /// Read-ahead window in bytes
    pub window_size: usize,
    /// Pause after a mismatched RIFF/ftyp signature, in milliseconds
    pub mismatch_backoff_ms: u64,
    /// Progress update interval in MiB
    pub progress_interval_mib: u64,
    /// Scan and report only
    pub dry_run: bool,
    /// Write manifest.json under the output root
    pub write_manifest: bool,
}

impl Default for CarveConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("dump"),
            window_size: DEFAULT_WINDOW_SIZE,
            mismatch_backoff_ms: 5000,
            progress_interval_mib: 1,
            dry_run: false,
            write_manifest: false,
        }
    }
}

/// Format selection and whitelist extensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatsConfig {
    /// Kinds to carve
    pub enabled: Vec<MediaKind>,
    /// Additional RIFF subchunks accepted inside a WAV
    pub extra_wav_chunks: Vec<String>,
    /// Additional top-level atoms accepted inside an MP4
    pub extra_mp4_atoms: Vec<String>,
    /// Additional ftyp brands that start an MP4
    pub extra_mp4_brands: Vec<String>,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            enabled: MediaKind::ALL.to_vec(),
            extra_wav_chunks: Vec::new(),
            extra_mp4_atoms: Vec::new(),
            extra_mp4_brands: Vec::new(),
        }
    }
}

impl FormatsConfig {
    /// Built-in tables plus the configured extras. Names that aren't valid
    /// four-character codes are logged and skipped.
    pub fn tables(&self) -> FormatTables {
        let mut tables = FormatTables::default();
        let extras = [
            ("extra_wav_chunks", &mut tables.wav_chunks, &self.extra_wav_chunks),
            ("extra_mp4_atoms", &mut tables.mp4_atoms, &self.extra_mp4_atoms),
            ("extra_mp4_brands", &mut tables.mp4_brands, &self.extra_mp4_brands),
        ];
        for (key, set, names) in extras {
            for bad in set.extend_names(names) {
                tracing::warn!(key, name = bad, "Ignoring tag that is not a four-character code");
            }
        }
        tables
    }
}

impl Config {
    /// Load config from default path or return defaults
    pub fn load() -> Self {
        Self::load_from(&Self::default_path()).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;

        Ok(config)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// Write the commented sample config to `path` unless a file is
    /// already there. Returns whether it was written.
    pub fn write_sample(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, generate_sample_config())
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(true)
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "mediacarve", "mediacarve")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".mediacarve")
                    .join("config.toml")
            })
    }

    /// Carve options for `source` from these settings
    pub fn carve_options(&self, source: PathBuf) -> CarveOptions {
        CarveOptions {
            source,
            output_root: self.carve.output_root.clone(),
            window_size: self.carve.window_size,
            mismatch_backoff: Duration::from_millis(self.carve.mismatch_backoff_ms),
            progress_interval: self.carve.progress_interval_mib.max(1) * 1024 * 1024,
            dry_run: self.carve.dry_run,
            kinds: self.formats.enabled.clone(),
            tables: self.formats.tables(),
        }
    }
}

/// Generate a sample config file with comments
pub fn generate_sample_config() -> String {
    r#"# mediacarve configuration
# Location: ~/.config/mediacarve/config.toml (or %APPDATA%\mediacarve\config.toml on Windows)

[general]
# Log level: trace, debug, info, warn, error
log_level = "info"

[carve]
# Recovered files go to <output_root>/Photos, /Videos and /Audio
output_root = "dump"

# Read-ahead window of the scanner (bytes)
window_size = 4096

# Pause after a RIFF or ftyp signature that turns out not to be WAV/MP4
mismatch_backoff_ms = 5000

# Progress update interval (MiB)
progress_interval_mib = 1

# Only report what would be carved
dry_run = false

# Write manifest.json with every artifact's extent and blake3 hash
write_manifest = false

[formats]
# Kinds to carve: "jpeg", "png", "wav", "mp4"
enabled = ["jpeg", "png", "wav", "mp4"]

# Extra tags on top of the built-in tables (four characters, padded with spaces)
# Example: extra_wav_chunks = ["LIST", "fact"]
extra_wav_chunks = []
extra_mp4_atoms = []
extra_mp4_brands = []
"#
    .to_string()
}

//! File carving module - Recover media files from raw byte streams by signature.
//!
//! Walks a disk image, memory dump or damaged container one byte at a time
//! with a rolling 4-byte window. When the window matches a lead signature
//! the follow-up bytes are confirmed, then the format's scanner is driven
//! until it reports where the extent ends. The extent `[start, end)`, plus
//! a synthetic trailer when the scanner stopped early, is written out as a
//! numbered artifact.
//!
//! # Design
//!
//! - **Buffered source**: one [`ByteSource`] owned by the driver and lent to
//!   each scanner step
//! - **Step scanners**: per-format state machines ([`jpeg`], [`png`],
//!   [`wav`], [`mp4`]) that consume one structural unit per call
//! - **Forward progress**: every signature branch resumes strictly past the
//!   offset it matched at, so the scan terminates on any input
//! - **Output layout**: `<root>/Photos`, `<root>/Videos`, `<root>/Audio`,
//!   files named by a per-kind counter starting at 1

pub mod jpeg;
pub mod mp4;
pub mod png;
pub mod report;
pub mod scanner;
pub mod signatures;
pub mod wav;

use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::source::{ByteSource, DEFAULT_WINDOW_SIZE};

pub use jpeg::JpegScanner;
pub use mp4::Mp4Scanner;
pub use png::PngScanner;
pub use scanner::{run_to_end, FormatScanner, ScanStep, Termination};
pub use signatures::{FormatTables, FourCc, MediaKind, TagSet};
pub use wav::WavScanner;

use signatures::{lead_kind, PNG_SIGNATURE_TAIL, WAVE_FORM};

/// Pause after a RIFF/`ftyp` signature whose follow-up bytes don't match
pub const DEFAULT_MISMATCH_BACKOFF: Duration = Duration::from_secs(5);

/// Bytes between two `Scanning` progress updates
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1024 * 1024;

/// A recovered file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: MediaKind,
    /// Per-kind counter, also the file stem
    pub sequence: u64,
    /// First byte of the extent in the source
    pub start: u64,
    /// One past the last byte of the extent in the source
    pub end: u64,
    /// Ended early; a synthetic trailer was appended
    pub partial: bool,
    /// Length of the appended trailer (0 when complete)
    pub trailer_len: usize,
    /// Bytes written, trailer included
    pub size: u64,
    pub path: PathBuf,
    /// Blake3 of the written content (None on dry runs)
    pub blake3: Option<String>,
}

/// Options for a carve operation
#[derive(Debug, Clone)]
pub struct CarveOptions {
    /// Source image, device or dump
    pub source: PathBuf,
    /// Root under which Photos/Videos/Audio are created
    pub output_root: PathBuf,
    /// Read-ahead window of the byte source
    pub window_size: usize,
    /// Pause after a mismatched RIFF/`ftyp` follow-up
    pub mismatch_backoff: Duration,
    /// Bytes between two progress updates
    pub progress_interval: u64,
    /// Don't write files, just scan and report
    pub dry_run: bool,
    /// Kinds to carve; others are skipped at signature level
    pub kinds: Vec<MediaKind>,
    /// WAV chunk, MP4 atom and MP4 brand whitelists
    pub tables: FormatTables,
}

impl Default for CarveOptions {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            output_root: PathBuf::from("dump"),
            window_size: DEFAULT_WINDOW_SIZE,
            mismatch_backoff: DEFAULT_MISMATCH_BACKOFF,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            dry_run: false,
            kinds: MediaKind::ALL.to_vec(),
            tables: FormatTables::default(),
        }
    }
}

/// Result of a carve operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarveSummary {
    pub artifacts: usize,
    pub by_kind: BTreeMap<MediaKind, usize>,
    pub partial: usize,
    pub failed: usize,
    pub bytes_extracted: u64,
    pub source_size: u64,
    pub duration_ms: u64,
}

impl CarveSummary {
    fn record(&mut self, artifact: &Artifact) {
        self.artifacts += 1;
        *self.by_kind.entry(artifact.kind).or_insert(0) += 1;
        if artifact.partial {
            self.partial += 1;
        }
        self.bytes_extracted += artifact.size;
    }

    pub fn count(&self, kind: MediaKind) -> usize {
        self.by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Progress updates emitted during carving
#[derive(Debug, Clone)]
pub enum CarveProgress {
    /// Scanning phase: bytes_scanned out of total
    Scanning { bytes_scanned: u64, total_bytes: u64 },
    /// An artifact was written (or found, on dry runs)
    Recovered(Artifact),
    /// Done
    Done,
}

/// Extent reported by a scanner run, before it becomes an artifact
#[derive(Debug, Clone, Copy)]
struct Extent {
    kind: MediaKind,
    start: u64,
    end: u64,
    partial: bool,
}

/// Extent (if any) plus the offset scanning resumes from
type Outcome = (Option<Extent>, u64);

#[derive(Default)]
struct Tally {
    sequences: BTreeMap<MediaKind, u64>,
    artifacts: Vec<Artifact>,
    summary: CarveSummary,
}

impl Tally {
    fn next_sequence(&mut self, kind: MediaKind) -> u64 {
        let counter = self.sequences.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// The file carver engine
pub struct Carver {
    options: CarveOptions,
}

impl Carver {
    pub fn new(options: CarveOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CarveOptions {
        &self.options
    }

    /// Carve `options.source` with a progress callback.
    ///
    /// A source that cannot be opened is logged and yields an empty result;
    /// only output-directory failures and read errors on an opened source
    /// are returned as errors.
    pub fn carve_with_progress<F>(&self, on_progress: F) -> Result<(Vec<Artifact>, CarveSummary)>
    where
        F: Fn(CarveProgress),
    {
        let source = &self.options.source;
        let opened = ByteSource::open_with_window(source, self.options.window_size);

        let mut src = match opened {
            Ok(src) => src,
            Err(e) => {
                tracing::error!(source = %source.display(), error = %e, "Could not open source");
                on_progress(CarveProgress::Done);
                tracing::info!("Finished");
                return Ok((Vec::new(), CarveSummary::default()));
            }
        };

        self.carve_source(&mut src, on_progress)
    }

    /// Convenience wrapper without progress (for tests and non-interactive use)
    pub fn carve(&self) -> Result<(Vec<Artifact>, CarveSummary)> {
        self.carve_with_progress(|_| {})
    }

    /// Carve an already opened byte source.
    pub fn carve_source<R, F>(
        &self,
        src: &mut ByteSource<R>,
        on_progress: F,
    ) -> Result<(Vec<Artifact>, CarveSummary)>
    where
        R: Read + Seek,
        F: Fn(CarveProgress),
    {
        let started = Instant::now();
        let total_bytes = src.size();

        tracing::info!(
            source = %self.options.source.display(),
            size = total_bytes,
            output_root = %self.options.output_root.display(),
            kinds = ?self.options.kinds,
            dry_run = self.options.dry_run,
            "Starting carve"
        );

        if !self.options.dry_run {
            self.prepare_output()?;
        }

        let mut tally = Tally::default();
        tally.summary.source_size = total_bytes;

        let interval = self.options.progress_interval.max(1);
        let mut next_report = 0u64;
        let mut window = [0u8; 4];

        loop {
            let p = src.tell();
            if p >= next_report {
                on_progress(CarveProgress::Scanning {
                    bytes_scanned: p,
                    total_bytes,
                });
                next_report = p.saturating_add(interval);
            }

            if src.read(&mut window).context("Failed to read source")? < window.len() {
                break;
            }

            let kind = match lead_kind(&window) {
                Some(kind) if self.options.kinds.contains(&kind) => kind,
                _ => {
                    src.seek(-3);
                    continue;
                }
            };

            let (extent, resume) = match kind {
                MediaKind::Jpeg => self.scan_jpeg(src, p),
                MediaKind::Png => self.scan_png(src, p),
                MediaKind::Wav => self.scan_wav(src, p),
                MediaKind::Mp4 => self.scan_mp4(src, p),
            }
            .with_context(|| format!("Failed to read {kind} candidate at offset {p:#x}"))?;

            if let Some(extent) = extent {
                if let Some(artifact) = self.emit(src, extent, &mut tally) {
                    on_progress(CarveProgress::Recovered(artifact));
                }
            }

            src.rewind_to(resume.max(p + 1));
        }

        on_progress(CarveProgress::Scanning {
            bytes_scanned: total_bytes,
            total_bytes,
        });
        on_progress(CarveProgress::Done);

        let mut summary = tally.summary;
        summary.duration_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            artifacts = summary.artifacts,
            partial = summary.partial,
            failed = summary.failed,
            bytes = summary.bytes_extracted,
            duration_ms = summary.duration_ms,
            "Finished"
        );

        Ok((tally.artifacts, summary))
    }

    fn prepare_output(&self) -> Result<()> {
        for folder in ["Photos", "Videos", "Audio"] {
            let dir = self.options.output_root.join(folder);
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Where artifact `sequence` of `kind` is written
    pub fn artifact_path(&self, kind: MediaKind, sequence: u64) -> PathBuf {
        self.options
            .output_root
            .join(kind.folder())
            .join(format!("{sequence}.{}", kind.extension()))
    }

    fn back_off(&self) {
        if !self.options.mismatch_backoff.is_zero() {
            std::thread::sleep(self.options.mismatch_backoff);
        }
    }

    fn scan_jpeg<R: Read + Seek>(&self, src: &mut ByteSource<R>, p: u64) -> Result<Outcome, SourceError> {
        tracing::info!(offset = p, "JPEG signature found");
        // Scanner starts on the APPn marker
        src.rewind_to(p + 2);
        let end = run_to_end(&mut JpegScanner::new(), src)?;
        let stop = src.tell();
        Ok((
            Some(Extent {
                kind: MediaKind::Jpeg,
                start: p,
                end: stop,
                partial: end.partial,
            }),
            stop,
        ))
    }

    fn scan_png<R: Read + Seek>(&self, src: &mut ByteSource<R>, p: u64) -> Result<Outcome, SourceError> {
        let mut tail = [0u8; 4];
        let got = src.read(&mut tail)?;
        if got < tail.len() || tail != PNG_SIGNATURE_TAIL {
            tracing::debug!(offset = p, "PNG lead bytes without signature tail");
            return Ok((None, p + 1));
        }

        tracing::info!(offset = p, "PNG signature found");
        let mut scanner = PngScanner::new(p + 8);
        let end = run_to_end(&mut scanner, src)?;
        let stop = src.tell();
        Ok((
            Some(Extent {
                kind: MediaKind::Png,
                start: p,
                end: stop,
                partial: end.partial,
            }),
            stop,
        ))
    }

    fn scan_wav<R: Read + Seek>(&self, src: &mut ByteSource<R>, p: u64) -> Result<Outcome, SourceError> {
        // RIFF length (ignored) + form type
        let mut rest = [0u8; 8];
        let got = src.read(&mut rest)?;
        if got < rest.len() || rest[4..] != WAVE_FORM.0 {
            tracing::info!(offset = p, "RIFF container is not WAVE, skipping");
            self.back_off();
            return Ok((None, p + 1));
        }

        tracing::info!(offset = p, "WAV signature found");
        let mut scanner = WavScanner::new(&self.options.tables.wav_chunks);
        let end = run_to_end(&mut scanner, src)?;
        if !scanner.is_valid() {
            tracing::info!(offset = p, "WAV has no data chunk, skipping");
            return Ok((None, p + 1));
        }

        let stop = src.tell();
        Ok((
            Some(Extent {
                kind: MediaKind::Wav,
                start: p,
                end: stop,
                partial: end.partial,
            }),
            stop,
        ))
    }

    fn scan_mp4<R: Read + Seek>(&self, src: &mut ByteSource<R>, p: u64) -> Result<Outcome, SourceError> {
        let mut brand = [0u8; 4];
        let got = src.read(&mut brand)?;
        let brand = FourCc(brand);

        // The atom size sits in the 4 bytes before `ftyp`
        if p < 4 || got < 4 || !self.options.tables.mp4_brands.contains(brand) {
            tracing::info!(offset = p, %brand, "Unknown ftyp subtype, skipping");
            self.back_off();
            return Ok((None, p + 1));
        }

        tracing::info!(offset = p, %brand, "MP4 signature found");
        let start = p - 4;
        src.rewind_to(start);
        let end = run_to_end(&mut Mp4Scanner::new(&self.options.tables.mp4_atoms), src)?;

        // Resume inside the container so embedded media is still found
        Ok((
            Some(Extent {
                kind: MediaKind::Mp4,
                start,
                end: src.tell(),
                partial: end.partial,
            }),
            p + 1,
        ))
    }

    fn emit<R: Read + Seek>(
        &self,
        src: &mut ByteSource<R>,
        extent: Extent,
        tally: &mut Tally,
    ) -> Option<Artifact> {
        // Every dispatched extent takes a number, written or not
        let sequence = tally.next_sequence(extent.kind);

        if extent.end <= extent.start {
            tracing::debug!(kind = %extent.kind, offset = extent.start, sequence, "Empty extent, nothing to write");
            return None;
        }

        let path = self.artifact_path(extent.kind, sequence);
        let trailer: &[u8] = if extent.partial {
            extent.kind.partial_trailer()
        } else {
            &[]
        };

        let (size, blake3) = if self.options.dry_run {
            (extent.end - extent.start + trailer.len() as u64, None)
        } else {
            match src.extract_range(&path, extent.start, extent.end, trailer) {
                Ok(extraction) => (extraction.bytes_written, Some(extraction.blake3)),
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        start = extent.start,
                        end = extent.end,
                        "Failed to write carved file"
                    );
                    tally.summary.failed += 1;
                    return None;
                }
            }
        };

        let artifact = Artifact {
            kind: extent.kind,
            sequence,
            start: extent.start,
            end: extent.end,
            partial: extent.partial,
            trailer_len: trailer.len(),
            size,
            path,
            blake3,
        };

        tracing::info!(
            kind = %artifact.kind,
            sequence,
            start = artifact.start,
            end = artifact.end,
            partial = artifact.partial,
            "Recovered {}",
            artifact.path.display()
        );

        tally.summary.record(&artifact);
        tally.artifacts.push(artifact.clone());
        Some(artifact)
    }
}

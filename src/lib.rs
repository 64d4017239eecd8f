//! mediacarve Library
//!
//! Signature-based file carving: recovers JPEG, PNG, WAV and MP4 files from
//! raw byte streams (disk images, memory dumps, damaged containers) without
//! any filesystem metadata, using only each format's signature and internal
//! structure to find where a file ends.
//!
//! # Features
//!
//! - **Buffered source**: sequential-biased reads over arbitrarily large images
//! - **Structural scanners**: JPEG markers, CRC-checked PNG chunks, RIFF
//!   subchunks, ISO-BMFF atoms
//! - **Partial recovery**: truncated or corrupted files are cut at the last
//!   good boundary and closed with a synthetic trailer
//! - **Blake3 digests**: every written artifact is hashed while it's written
//!
//! # Example
//!
//! ```no_run
//! use mediacarve::{CarveOptions, Carver};
//! use std::path::PathBuf;
//!
//! fn main() -> anyhow::Result<()> {
//!     let carver = Carver::new(CarveOptions {
//!         source: PathBuf::from("card.dd"),
//!         output_root: PathBuf::from("recovered"),
//!         ..Default::default()
//!     });
//!
//!     let (artifacts, summary) = carver.carve()?;
//!     println!("Recovered {} files ({} partial)", artifacts.len(), summary.partial);
//!     Ok(())
//! }
//! ```

pub mod carve;
pub mod cli;
pub mod config;
pub mod crc;
pub mod error;
pub mod source;

// Re-export commonly used types
pub use carve::{Artifact, CarveOptions, CarveProgress, CarveSummary, Carver, MediaKind};
pub use config::Config;
pub use crc::{crc32, Crc32};
pub use error::{Rejection, SourceError};
pub use source::{ByteSource, Extraction};

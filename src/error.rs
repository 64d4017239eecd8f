//! Error types
//!
//! Two families live here:
//!
//! - [`SourceError`]: genuine I/O failures on the input stream or an output
//!   artifact. These propagate with `?`.
//! - [`Rejection`]: why a format scanner stopped walking a container. These
//!   never propagate as failures; the scanner rewinds and the driver logs
//!   the reason next to the (possibly partial) artifact.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::carve::signatures::FourCc;

/// I/O failure while reading the source or writing a carved artifact
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open source {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read failed at offset {offset:#x}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("seek to offset {offset:#x} failed: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to create artifact {}: {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write artifact data: {source}")]
    Write {
        #[source]
        source: io::Error,
    },

    #[error("invalid extraction range {start:#x}..{end:#x}")]
    InvalidRange { start: u64, end: u64 },
}

/// Why a scanner stopped before (or instead of) reaching a clean end marker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Fewer bytes were available than the structure needs
    #[error("stream exhausted after {got} of {wanted} bytes")]
    StreamExhausted { wanted: usize, got: usize },

    /// A declared length cannot be right for the remaining stream
    #[error("declared length {declared} is invalid ({remaining} bytes remain)")]
    MalformedLength { declared: u64, remaining: u64 },

    /// Stored and computed PNG chunk CRC differ
    #[error("CRC mismatch in chunk {tag}: stored {stored:#010x}, computed {computed:#010x}")]
    IntegrityMismatch {
        tag: FourCc,
        stored: u32,
        computed: u32,
    },

    /// A chunk/atom type outside the known table
    #[error("unrecognized tag {tag}")]
    UnrecognizedTag { tag: FourCc },

    /// A JPEG marker byte the scanner has no rule for
    #[error("unexpected JPEG marker 0x{marker:02X}")]
    UnexpectedMarker { marker: u8 },
}

//! RIFF/WAVE extent scanner (subchunk driven).
//!
//! Skips known subchunks by their little-endian length. The first subchunk
//! with an unknown tag is taken as the end of the container. A WAV only
//! counts as recovered once a `data` subchunk has been seen.

use std::io::{Read, Seek};

use crate::error::{Rejection, SourceError};
use crate::source::ByteSource;

use super::scanner::{FormatScanner, ScanStep};
use super::signatures::{riff_chunk_length, split_header, FourCc, MediaKind, TagSet, WAV_DATA};

#[derive(Debug)]
pub struct WavScanner<'t> {
    chunks: &'t TagSet,
    valid: bool,
}

impl<'t> WavScanner<'t> {
    pub fn new(chunks: &'t TagSet) -> Self {
        Self {
            chunks,
            valid: false,
        }
    }

    /// Whether a `data` subchunk was observed
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl FormatScanner for WavScanner<'_> {
    const KIND: MediaKind = MediaKind::Wav;

    fn step<R: Read + Seek>(&mut self, src: &mut ByteSource<R>) -> Result<ScanStep, SourceError> {
        let mut header = [0u8; 8];
        let got = src.read(&mut header)?;
        if got < header.len() {
            src.seek(-(got as i64));
            return Ok(ScanStep::Rejected {
                partial: false,
                reason: Rejection::StreamExhausted { wanted: 8, got },
            });
        }

        let (tag, length_field) = split_header(&header);
        let tag = FourCc(tag);
        let length = u64::from(riff_chunk_length(length_field));

        if tag == WAV_DATA {
            self.valid = true;
        }

        if !self.chunks.contains(tag) {
            tracing::info!(%tag, "Unsupported subchunk, assuming end of file");
            src.seek(-8);
            return Ok(ScanStep::Rejected {
                partial: false,
                reason: Rejection::UnrecognizedTag { tag },
            });
        }

        if length > src.remaining() {
            let remaining = src.remaining();
            tracing::info!(%tag, length, remaining, "Invalid subchunk length, attempting partial dump");
            src.seek(-8);
            return Ok(ScanStep::Rejected {
                partial: true,
                reason: Rejection::MalformedLength {
                    declared: length,
                    remaining,
                },
            });
        }

        tracing::trace!(%tag, length, offset = src.tell(), "Skipping subchunk");
        src.seek(length as i64);
        Ok(ScanStep::Continue)
    }
}

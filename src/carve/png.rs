//! PNG extent scanner (chunk driven, CRC validated).
//!
//! Each call validates one chunk: length against the remaining stream, then
//! CRC-32 over type + payload against the stored value. Any failure drops
//! the offending chunk entirely and rewinds to the end of the last good one.

use std::io::{Read, Seek};

use crate::crc::Crc32;
use crate::error::{Rejection, SourceError};
use crate::source::ByteSource;

use super::scanner::{FormatScanner, ScanStep};
use super::signatures::{png_chunk_crc, png_chunk_length, split_header, FourCc, MediaKind, PNG_IEND};

/// Payload is streamed through the CRC in pieces of this size
const CRC_PIECE: usize = 512;

#[derive(Debug)]
pub struct PngScanner {
    prev_boundary: u64,
    crc: Crc32,
    piece: [u8; CRC_PIECE],
}

impl PngScanner {
    /// `first_chunk` is the offset right after the 8-byte signature
    pub fn new(first_chunk: u64) -> Self {
        Self {
            prev_boundary: first_chunk,
            crc: Crc32::new(),
            piece: [0u8; CRC_PIECE],
        }
    }

    /// End of the last chunk that validated
    pub fn prev_boundary(&self) -> u64 {
        self.prev_boundary
    }

    fn reject<R: Read + Seek>(&self, src: &mut ByteSource<R>, reason: Rejection) -> ScanStep {
        src.rewind_to(self.prev_boundary);
        ScanStep::Rejected {
            partial: true,
            reason,
        }
    }
}

impl FormatScanner for PngScanner {
    const KIND: MediaKind = MediaKind::Png;

    fn step<R: Read + Seek>(&mut self, src: &mut ByteSource<R>) -> Result<ScanStep, SourceError> {
        let mut header = [0u8; 8];
        let got = src.read(&mut header)?;
        if got < header.len() {
            return Ok(self.reject(src, Rejection::StreamExhausted { wanted: 8, got }));
        }

        let (length_field, tag) = split_header(&header);
        let length = u64::from(png_chunk_length(length_field));
        let tag = FourCc(tag);

        if length > src.remaining() {
            let remaining = src.remaining();
            tracing::info!(%tag, length, remaining, "Chunk is too big for the stream; dumping partially");
            return Ok(self.reject(
                src,
                Rejection::MalformedLength {
                    declared: length,
                    remaining,
                },
            ));
        }

        self.crc.reset();
        self.crc.update(&tag.0);
        let mut left = length;
        while left > 0 {
            let want = left.min(CRC_PIECE as u64) as usize;
            let n = src.read(&mut self.piece[..want])?;
            if n == 0 {
                break;
            }
            self.crc.update(&self.piece[..n]);
            left -= n as u64;
        }
        let computed = self.crc.finish();

        let mut stored = [0u8; 4];
        let got = src.read(&mut stored)?;
        if got < stored.len() {
            return Ok(self.reject(src, Rejection::StreamExhausted { wanted: 4, got }));
        }
        let stored = png_chunk_crc(stored);

        if stored != computed {
            tracing::info!(%tag, "CRC32 for chunk doesn't match; dumping partially");
            return Ok(self.reject(
                src,
                Rejection::IntegrityMismatch {
                    tag,
                    stored,
                    computed,
                },
            ));
        }

        if tag == PNG_IEND {
            return Ok(ScanStep::Complete { partial: false });
        }

        tracing::trace!(%tag, length, offset = src.tell(), "Chunk validated");
        self.prev_boundary = src.tell();
        Ok(ScanStep::Continue)
    }
}

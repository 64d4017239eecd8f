//! ISO-BMFF / MP4 extent scanner (top-level atom driven).
//!
//! Walks top-level atoms by their big-endian size, which includes the
//! header. An atom type outside the known table ends the container. Sizes
//! of 1 mean a 64-bit `largesize` follows the type.

use std::io::{Read, Seek};

use crate::error::{Rejection, SourceError};
use crate::source::ByteSource;

use super::scanner::{FormatScanner, ScanStep};
use super::signatures::{atom_largesize, atom_size, split_header, FourCc, MediaKind, TagSet};

const HEADER_LEN: u64 = 8;
const LARGE_HEADER_LEN: u64 = 16;

#[derive(Debug)]
pub struct Mp4Scanner<'t> {
    atoms: &'t TagSet,
}

impl<'t> Mp4Scanner<'t> {
    pub fn new(atoms: &'t TagSet) -> Self {
        Self { atoms }
    }

    fn malformed<R: Read + Seek>(
        src: &mut ByteSource<R>,
        header_len: u64,
        declared: u64,
    ) -> ScanStep {
        let remaining = src.remaining();
        tracing::info!(declared, remaining, "Invalid atom length, attempting partial dump");
        src.seek(-(header_len as i64));
        ScanStep::Rejected {
            partial: true,
            reason: Rejection::MalformedLength {
                declared,
                remaining,
            },
        }
    }
}

impl FormatScanner for Mp4Scanner<'_> {
    const KIND: MediaKind = MediaKind::Mp4;

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

        let (size_field, tag) = split_header(&header);
        let tag = FourCc(tag);

        if !self.atoms.contains(tag) {
            tracing::info!(%tag, "Unsupported atom type, assuming end of file");
            src.seek(-(HEADER_LEN as i64));
            return Ok(ScanStep::Rejected {
                partial: false,
                reason: Rejection::UnrecognizedTag { tag },
            });
        }

        let (size, header_len) = match atom_size(size_field) {
            0 => return Ok(Self::malformed(src, HEADER_LEN, 0)),
            1 => {
                let mut large = [0u8; 8];
                let got = src.read(&mut large)?;
                if got < large.len() {
                    src.seek(-((HEADER_LEN as usize + got) as i64));
                    return Ok(ScanStep::Rejected {
                        partial: true,
                        reason: Rejection::StreamExhausted { wanted: 8, got },
                    });
                }
                (atom_largesize(large), LARGE_HEADER_LEN)
            }
            n => (u64::from(n), HEADER_LEN),
        };

        match size.checked_sub(header_len) {
            Some(payload) if payload <= src.remaining() => {
                tracing::trace!(%tag, size, offset = src.tell(), "Skipping atom");
                src.seek(payload as i64);
                Ok(ScanStep::Continue)
            }
            _ => Ok(Self::malformed(src, header_len, size)),
        }
    }
}

//! JPEG extent scanner (marker driven).
//!
//! Walks markers from just after SOI. Length-bearing segments are skipped
//! using their big-endian length; everything between markers (entropy-coded
//! scan data) is stepped over one byte at a time until the next `0xFF`.

use std::io::{Read, Seek};

use crate::error::{Rejection, SourceError};
use crate::source::ByteSource;

use super::scanner::{FormatScanner, ScanStep};
use super::signatures::{jpeg_segment_length, MediaKind};

/// APP0 (JFIF) segments shorter than this are malformed
pub const APP0_MIN_LENGTH: u16 = 16;

const APP0: u8 = 0xE0;

/// What a marker byte (the one after `0xFF`) means to the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerClass {
    /// SOI: a new image starts here
    StartOfImage,
    /// EOI
    EndOfImage,
    /// Segment with a length field (SOFn, DHT, DAC, SOS, DQT, DNL, DHP, EXP, COM)
    Segment,
    /// APPn, length field with an APP0 minimum
    Application,
    /// No payload (RSTn, TEM, JPGn, stuffed `FF 00`)
    Standalone,
    /// Fill byte: the second `FF` may start the real marker
    Fill,
    /// DRI: fixed two-byte skip
    RestartInterval,
    Unknown,
}

const MARKER_TABLE: [MarkerClass; 256] = {
    let mut table = [MarkerClass::Unknown; 256];

    let mut m = 0xC0;
    while m <= 0xCF {
        table[m] = MarkerClass::Segment;
        m += 1;
    }
    let mut m = 0xD0;
    while m <= 0xD7 {
        table[m] = MarkerClass::Standalone;
        m += 1;
    }
    let mut m = 0xE0;
    while m <= 0xEF {
        table[m] = MarkerClass::Application;
        m += 1;
    }
    let mut m = 0xF0;
    while m <= 0xFD {
        table[m] = MarkerClass::Standalone;
        m += 1;
    }

    table[0x00] = MarkerClass::Standalone;
    table[0x01] = MarkerClass::Standalone;
    table[0xD8] = MarkerClass::StartOfImage;
    table[0xD9] = MarkerClass::EndOfImage;
    table[0xDA] = MarkerClass::Segment;
    table[0xDB] = MarkerClass::Segment;
    table[0xDC] = MarkerClass::Segment;
    table[0xDD] = MarkerClass::RestartInterval;
    table[0xDE] = MarkerClass::Segment;
    table[0xDF] = MarkerClass::Segment;
    table[0xFE] = MarkerClass::Segment;
    table[0xFF] = MarkerClass::Fill;
    table
};

#[inline]
pub fn classify(marker: u8) -> MarkerClass {
    MARKER_TABLE[marker as usize]
}

/// Stateless: everything it needs is the current source position
#[derive(Debug, Default)]
pub struct JpegScanner;

impl JpegScanner {
    pub fn new() -> Self {
        Self
    }

    fn skip_segment<R: Read + Seek>(
        &mut self,
        src: &mut ByteSource<R>,
        marker: u8,
    ) -> Result<ScanStep, SourceError> {
        let mut field = [0u8; 2];
        let got = src.read(&mut field)?;
        if got < 2 {
            return Ok(ScanStep::Rejected {
                partial: true,
                reason: Rejection::StreamExhausted { wanted: 2, got },
            });
        }

        let length = jpeg_segment_length(field);

        if marker == APP0 && length < APP0_MIN_LENGTH {
            src.seek(-1);
            return Ok(ScanStep::Rejected {
                partial: true,
                reason: Rejection::MalformedLength {
                    declared: length.into(),
                    remaining: src.remaining(),
                },
            });
        }

        let payload = u64::from(length).checked_sub(2);
        match payload {
            Some(payload) if payload <= src.remaining() => {
                tracing::trace!(marker, length, offset = src.tell(), "Skipping segment");
                src.seek(payload as i64);
                Ok(ScanStep::Continue)
            }
            _ => {
                let remaining = src.remaining();
                // Back to the marker so the extent ends before it.
                src.seek(-4);
                Ok(ScanStep::Rejected {
                    partial: true,
                    reason: Rejection::MalformedLength {
                        declared: length.into(),
                        remaining,
                    },
                })
            }
        }
    }
}

impl FormatScanner for JpegScanner {
    const KIND: MediaKind = MediaKind::Jpeg;

    fn step<R: Read + Seek>(&mut self, src: &mut ByteSource<R>) -> Result<ScanStep, SourceError> {
        let mut marker = [0u8; 2];
        let got = src.read(&mut marker)?;
        if got < 2 {
            return Ok(ScanStep::Rejected {
                partial: true,
                reason: Rejection::StreamExhausted { wanted: 2, got },
            });
        }

        if marker[0] != 0xFF {
            // Not on a marker (scan data): slide forward one byte.
            src.seek(-1);
            return Ok(ScanStep::Continue);
        }

        match classify(marker[1]) {
            MarkerClass::StartOfImage => {
                src.seek(-2);
                tracing::info!(offset = src.tell(), "Image incomplete, next SOI reached; dumping partially");
                Ok(ScanStep::Complete { partial: true })
            }
            MarkerClass::EndOfImage => Ok(ScanStep::Complete { partial: false }),
            MarkerClass::Segment | MarkerClass::Application => self.skip_segment(src, marker[1]),
            MarkerClass::Standalone => Ok(ScanStep::Continue),
            MarkerClass::Fill => {
                src.seek(-1);
                Ok(ScanStep::Continue)
            }
            MarkerClass::RestartInterval => {
                src.seek(2);
                Ok(ScanStep::Continue)
            }
            MarkerClass::Unknown => {
                src.seek(-2);
                Ok(ScanStep::Rejected {
                    partial: true,
                    reason: Rejection::UnexpectedMarker { marker: marker[1] },
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::carve::scanner::run_to_end;
    use std::io::Cursor;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut s = vec![0xFF, marker];
        s.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        s.extend_from_slice(payload);
        s
    }

    /// Structurally valid baseline JPEG with scan data containing a stuffed
    /// byte and a restart marker
    pub(crate) fn sample_jpeg() -> Vec<u8> {
        let mut j = vec![0xFF, 0xD8];
        j.extend(segment(0xE0, b"JFIF\0\x01\x02\x00\x00\x01\x00\x01\x00\x00"));
        j.extend(segment(0xDB, &[1u8; 65]));
        j.extend(segment(0xC0, &[8, 0, 16, 0, 16, 1, 1, 0x11, 0]));
        j.extend(segment(0xC4, &[2u8; 20]));
        j.extend(segment(0xDA, &[1, 1, 0, 0, 63, 0]));
        j.extend([0x12, 0x34, 0xFF, 0x00, 0x56, 0xFF, 0xD0, 0x78, 0x9A]);
        j.extend([0xFF, 0xD9]);
        j
    }

    /// Source positioned right after SOI, where the driver hands over
    fn after_soi(data: Vec<u8>) -> ByteSource<Cursor<Vec<u8>>> {
        let mut src = ByteSource::with_window(Cursor::new(data), 32).unwrap();
        src.seek(2);
        src
    }

    #[test]
    fn test_marker_table() {
        assert_eq!(classify(0xD8), MarkerClass::StartOfImage);
        assert_eq!(classify(0xD9), MarkerClass::EndOfImage);
        assert_eq!(classify(0xC0), MarkerClass::Segment);
        assert_eq!(classify(0xC4), MarkerClass::Segment);
        assert_eq!(classify(0xDA), MarkerClass::Segment);
        assert_eq!(classify(0xDB), MarkerClass::Segment);
        assert_eq!(classify(0xFE), MarkerClass::Segment);
        assert_eq!(classify(0xE0), MarkerClass::Application);
        assert_eq!(classify(0xEF), MarkerClass::Application);
        assert_eq!(classify(0xD3), MarkerClass::Standalone);
        assert_eq!(classify(0x00), MarkerClass::Standalone);
        assert_eq!(classify(0xFF), MarkerClass::Fill);
        assert_eq!(classify(0xDD), MarkerClass::RestartInterval);
        assert_eq!(classify(0x02), MarkerClass::Unknown);
        assert_eq!(classify(0xBF), MarkerClass::Unknown);
    }

    #[test]
    fn test_complete_image() {
        let data = sample_jpeg();
        let len = data.len() as u64;
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(!end.partial);
        assert_eq!(end.reason, None);
        assert_eq!(src.tell(), len);
    }

    #[test]
    fn test_fill_bytes_before_eoi() {
        let mut data = sample_jpeg();
        let eoi = data.len() - 2;
        data.splice(eoi..eoi, [0xFF, 0xFF]);
        let len = data.len() as u64;
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(!end.partial);
        assert_eq!(src.tell(), len);
    }

    #[test]
    fn test_truncated_scan_data_runs_to_end_of_stream() {
        let mut data = sample_jpeg();
        data.truncate(data.len() - 4);
        let len = data.len() as u64;
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert!(matches!(end.reason, Some(Rejection::StreamExhausted { .. })));
        assert_eq!(src.tell(), len);
    }

    #[test]
    fn test_next_soi_ends_image_partially() {
        let mut data = sample_jpeg();
        data.truncate(data.len() - 2);
        let next = data.len() as u64;
        data.extend(sample_jpeg());
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert_eq!(end.reason, None);
        assert_eq!(src.tell(), next);
    }

    #[test]
    fn test_unknown_marker_rewinds_to_marker() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE0, &[0u8; 14]));
        let marker_at = data.len() as u64;
        data.extend([0xFF, 0x02, 0x00, 0x00]);
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert_eq!(end.reason, Some(Rejection::UnexpectedMarker { marker: 0x02 }));
        assert_eq!(src.tell(), marker_at);
    }

    #[test]
    fn test_short_app0_is_malformed() {
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x08];
        data.extend([0u8; 32]);
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert!(matches!(end.reason, Some(Rejection::MalformedLength { declared: 8, .. })));
        // Marker + length read, one byte given back
        assert_eq!(src.tell(), 5);
    }

    #[test]
    fn test_short_app1_is_fine() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE1, b"Exif"));
        data.extend([0xFF, 0xD9]);
        let len = data.len() as u64;
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(!end.partial);
        assert_eq!(src.tell(), len);
    }

    #[test]
    fn test_segment_longer_than_stream() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE0, &[0u8; 14]));
        let dqt_at = data.len() as u64;
        data.extend([0xFF, 0xDB, 0x10, 0x00, 1, 2, 3]);
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert!(matches!(end.reason, Some(Rejection::MalformedLength { declared: 0x1000, .. })));
        assert_eq!(src.tell(), dqt_at);
    }

    #[test]
    fn test_segment_length_below_two() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE0, &[0u8; 14]));
        let sof_at = data.len() as u64;
        data.extend([0xFF, 0xC0, 0x00, 0x01, 0, 0, 0, 0]);
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(end.partial);
        assert_eq!(src.tell(), sof_at);
    }

    #[test]
    fn test_restart_interval_skip() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(segment(0xE0, &[0u8; 14]));
        data.extend([0xFF, 0xDD, 0x00, 0x04, 0x00, 0x10]);
        data.extend([0xFF, 0xD9]);
        let len = data.len() as u64;
        let mut src = after_soi(data);

        let end = run_to_end(&mut JpegScanner::new(), &mut src).unwrap();
        assert!(!end.partial);
        assert_eq!(src.tell(), len);
    }
}

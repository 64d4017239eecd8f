//! Signature and tag tables for carving.
//!
//! Everything the scanners compare against lives here as data: lead
//! signatures, trailers, the WAV chunk / MP4 atom / MP4 brand whitelists,
//! and the per-format decoders for length and CRC fields. Endianness is
//! decided once, in the decoder named after the field it reads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Synthetic end-of-image marker appended to partial JPEGs
pub const JPEG_TRAILER: [u8; 2] = [0xFF, 0xD9];

/// Minimal IEND chunk appended to partial PNGs: zero length, tag, fixed CRC
pub const PNG_TRAILER: [u8; 12] = [
    0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Second half of the 8-byte PNG signature
pub const PNG_SIGNATURE_TAIL: [u8; 4] = [0x0D, 0x0A, 0x1A, 0x0A];

/// RIFF form type that makes a RIFF container a WAV
pub const WAVE_FORM: FourCc = FourCc(*b"WAVE");

pub const PNG_IEND: FourCc = FourCc(*b"IEND");
pub const WAV_DATA: FourCc = FourCc(*b"data");

/// RIFF subchunks a WAV may contain
pub const WAV_CHUNKS: &[[u8; 4]] = &[*b"fmt ", *b"data", *b"bext", *b"CDif"];

/// Top-level ISO-BMFF / QuickTime atoms
pub const MP4_ATOMS: &[[u8; 4]] = &[
    *b"ftyp", *b"mdat", *b"moov", *b"pnot", *b"udta", *b"uuid", *b"moof", *b"free",
    *b"skip", *b"wide", *b"load", *b"ctab", *b"imap", *b"matt", *b"kmat", *b"clip",
    *b"crgn", *b"sync", *b"chap", *b"tmcd", *b"scpt", *b"ssrc", *b"PICT", *b"meta",
    *b"mfra", *b"sidx", *b"styp", *b"pdin",
];

/// `ftyp` major brands accepted as the start of an MP4
pub const MP4_BRANDS: &[[u8; 4]] = &[
    *b"avc1", *b"iso2", *b"iso4", *b"iso5", *b"iso6", *b"isom", *b"mmp4", *b"mp41",
    *b"mp42", *b"mp71", *b"msnv", *b"ndas", *b"ndsc", *b"ndsh", *b"ndsm", *b"ndsp",
    *b"ndss", *b"ndxc", *b"ndxh", *b"ndxm", *b"ndxp", *b"ndxs", *b"3gp4", *b"3gp5",
    *b"3gp6", *b"3gp7", *b"M4A ", *b"M4V ",
];

/// Media kinds the carver recovers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Jpeg,
    Png,
    Wav,
    Mp4,
}

impl MediaKind {
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Jpeg,
        MediaKind::Png,
        MediaKind::Wav,
        MediaKind::Mp4,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            MediaKind::Jpeg => "jpg",
            MediaKind::Png => "png",
            MediaKind::Wav => "wav",
            MediaKind::Mp4 => "mp4",
        }
    }

    /// Destination folder under the output root
    pub fn folder(&self) -> &'static str {
        match self {
            MediaKind::Jpeg | MediaKind::Png => "Photos",
            MediaKind::Mp4 => "Videos",
            MediaKind::Wav => "Audio",
        }
    }

    /// Bytes appended when the extent is partial
    pub fn partial_trailer(&self) -> &'static [u8] {
        match self {
            MediaKind::Jpeg => &JPEG_TRAILER,
            MediaKind::Png => &PNG_TRAILER,
            MediaKind::Wav | MediaKind::Mp4 => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MediaKind::Jpeg => "Image (JPEG)",
            MediaKind::Png => "Image (PNG)",
            MediaKind::Wav => "Audio (WAV)",
            MediaKind::Mp4 => "Video/Audio (MP4)",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Identify which format a 4-byte window may start.
///
/// Only the lead bytes are checked here; the driver confirms the follow-up
/// bytes (PNG signature tail, RIFF form type, `ftyp` brand) itself.
pub fn lead_kind(window: &[u8; 4]) -> Option<MediaKind> {
    match window {
        [0xFF, 0xD8, 0xFF, 0xE0..=0xEF] => Some(MediaKind::Jpeg),
        [0x89, 0x50, 0x4E, 0x47] => Some(MediaKind::Png),
        b"RIFF" => Some(MediaKind::Wav),
        b"ftyp" => Some(MediaKind::Mp4),
        _ => None,
    }
}

/// A four-character code (chunk type, atom type, brand)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    /// Parse a tag from configuration. Shorter names are padded with
    /// spaces (`"M4A"` is `"M4A "`); anything non-ASCII or longer than four
    /// bytes is refused.
    pub fn parse(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !name.is_ascii() {
            return None;
        }
        let mut tag = [b' '; 4];
        tag[..bytes.len()].copy_from_slice(bytes);
        Some(Self(tag))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("'")?;
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        f.write_str("'")
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

/// Set-membership table of known tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSet {
    tags: Vec<FourCc>,
}

impl TagSet {
    pub fn from_static(tags: &[[u8; 4]]) -> Self {
        Self {
            tags: tags.iter().copied().map(FourCc).collect(),
        }
    }

    pub fn contains(&self, tag: FourCc) -> bool {
        self.tags.contains(&tag)
    }

    /// Add extra tags by name, returning the names that were not valid tags
    pub fn extend_names<'a, I>(&mut self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut invalid = Vec::new();
        for name in names {
            match FourCc::parse(name) {
                Some(tag) if !self.contains(tag) => self.tags.push(tag),
                Some(_) => {}
                None => invalid.push(name.as_str()),
            }
        }
        invalid
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Whitelists consulted by the WAV and MP4 scanners and the MP4 signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatTables {
    pub wav_chunks: TagSet,
    pub mp4_atoms: TagSet,
    pub mp4_brands: TagSet,
}

impl Default for FormatTables {
    fn default() -> Self {
        Self {
            wav_chunks: TagSet::from_static(WAV_CHUNKS),
            mp4_atoms: TagSet::from_static(MP4_ATOMS),
            mp4_brands: TagSet::from_static(MP4_BRANDS),
        }
    }
}

/// JPEG segment length: big-endian, counts its own two bytes
pub(crate) fn jpeg_segment_length(field: [u8; 2]) -> u16 {
    u16::from_be_bytes(field)
}

/// PNG chunk length: big-endian, payload only
pub(crate) fn png_chunk_length(field: [u8; 4]) -> u32 {
    u32::from_be_bytes(field)
}

/// PNG chunk CRC: big-endian, over type + payload
pub(crate) fn png_chunk_crc(field: [u8; 4]) -> u32 {
    u32::from_be_bytes(field)
}

/// RIFF subchunk length: little-endian, payload only
pub(crate) fn riff_chunk_length(field: [u8; 4]) -> u32 {
    u32::from_le_bytes(field)
}

/// ISO-BMFF atom size: big-endian, includes the 8-byte header
pub(crate) fn atom_size(field: [u8; 4]) -> u32 {
    u32::from_be_bytes(field)
}

/// ISO-BMFF 64-bit `largesize`, present when the 32-bit size is 1
pub(crate) fn atom_largesize(field: [u8; 8]) -> u64 {
    u64::from_be_bytes(field)
}

/// Split an 8-byte header into its two 4-byte halves
pub(crate) fn split_header(header: &[u8; 8]) -> ([u8; 4], [u8; 4]) {
    let mut first = [0u8; 4];
    let mut second = [0u8; 4];
    first.copy_from_slice(&header[..4]);
    second.copy_from_slice(&header[4..]);
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_kind() {
        assert_eq!(lead_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(MediaKind::Jpeg));
        assert_eq!(lead_kind(&[0xFF, 0xD8, 0xFF, 0xE1]), Some(MediaKind::Jpeg));
        assert_eq!(lead_kind(&[0xFF, 0xD8, 0xFF, 0xEF]), Some(MediaKind::Jpeg));
        assert_eq!(lead_kind(&[0xFF, 0xD8, 0xFF, 0xDB]), None);
        assert_eq!(lead_kind(&[0x89, b'P', b'N', b'G']), Some(MediaKind::Png));
        assert_eq!(lead_kind(b"RIFF"), Some(MediaKind::Wav));
        assert_eq!(lead_kind(b"ftyp"), Some(MediaKind::Mp4));
        assert_eq!(lead_kind(b"RIFX"), None);
        assert_eq!(lead_kind(&[0, 0, 0, 0]), None);
    }

    #[test]
    fn test_png_trailer_is_valid_iend() {
        assert_eq!(&PNG_TRAILER[4..8], b"IEND");
        let crc = u32::from_be_bytes([PNG_TRAILER[8], PNG_TRAILER[9], PNG_TRAILER[10], PNG_TRAILER[11]]);
        assert_eq!(crc, crate::crc::crc32(b"IEND"));
    }

    #[test]
    fn test_kind_layout() {
        assert_eq!(MediaKind::Jpeg.folder(), "Photos");
        assert_eq!(MediaKind::Png.folder(), "Photos");
        assert_eq!(MediaKind::Mp4.folder(), "Videos");
        assert_eq!(MediaKind::Wav.folder(), "Audio");
        assert!(MediaKind::Wav.partial_trailer().is_empty());
        assert!(MediaKind::Mp4.partial_trailer().is_empty());
        assert_eq!(MediaKind::Jpeg.partial_trailer(), &[0xFF, 0xD9]);
    }

    #[test]
    fn test_fourcc_parse_and_display() {
        assert_eq!(FourCc::parse("M4A"), Some(FourCc(*b"M4A ")));
        assert_eq!(FourCc::parse("LIST"), Some(FourCc(*b"LIST")));
        assert_eq!(FourCc::parse(""), None);
        assert_eq!(FourCc::parse("toolong"), None);
        assert_eq!(FourCc::parse("é"), None);

        assert_eq!(FourCc(*b"fmt ").to_string(), "'fmt '");
        assert_eq!(FourCc([0, b'a', 0xFF, b'b']).to_string(), "'\\x00a\\xFFb'");
    }

    #[test]
    fn test_tag_set_extension() {
        let mut set = TagSet::from_static(WAV_CHUNKS);
        assert!(!set.contains(FourCc(*b"LIST")));

        let names = vec!["LIST".to_string(), "data".to_string(), "bogus!".to_string()];
        let invalid = set.extend_names(&names);

        assert_eq!(invalid, vec!["bogus!"]);
        assert!(set.contains(FourCc(*b"LIST")));
        assert_eq!(set.len(), WAV_CHUNKS.len() + 1);
    }

    #[test]
    fn test_field_endianness() {
        assert_eq!(jpeg_segment_length([0x00, 0x10]), 16);
        assert_eq!(png_chunk_length([0x00, 0x00, 0x00, 0x0D]), 13);
        assert_eq!(png_chunk_crc([0xAE, 0x42, 0x60, 0x82]), 0xAE42_6082);
        assert_eq!(riff_chunk_length([0x10, 0x00, 0x00, 0x00]), 16);
        assert_eq!(atom_size([0x00, 0x00, 0x00, 0x18]), 24);
        assert_eq!(atom_largesize([0, 0, 0, 1, 0, 0, 0, 0]), 1 << 32);
    }
}

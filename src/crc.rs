//! CRC-32 (IEEE 802.3 / zlib / PNG)
//!
//! Reflected polynomial 0xEDB88320, initial register 0xFFFFFFFF, final xor
//! 0xFFFFFFFF. PNG chunk CRCs are compared against this bit for bit, so any
//! deviation silently breaks every valid PNG.

const POLYNOMIAL: u32 = 0xEDB8_8320;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Streaming CRC-32 accumulator
#[derive(Debug, Clone)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// Start over, as if freshly created
    pub fn reset(&mut self) {
        self.state = 0xFFFF_FFFF;
    }

    /// Feed more bytes; may be called any number of times
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.state ^ byte as u32) & 0xFF) as usize;
            self.state = (self.state >> 8) ^ CRC32_TABLE[index];
        }
    }

    /// Checksum of everything fed since the last reset
    #[inline]
    pub fn finish(&self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot CRC-32
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = Crc32::new();
    crc.update(data);
    crc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_iend_chunk_crc() {
        // The fixed CRC every PNG ends with
        assert_eq!(crc32(b"IEND"), 0xAE42_6082);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 + 3) as u8).collect();

        let mut crc = Crc32::new();
        for piece in data.chunks(512) {
            crc.update(piece);
        }
        assert_eq!(crc.finish(), crc32(&data));
    }

    #[test]
    fn test_reset() {
        let mut crc = Crc32::new();
        crc.update(b"garbage");
        crc.reset();
        crc.update(b"IEND");
        assert_eq!(crc.finish(), 0xAE42_6082);
    }

    #[test]
    fn test_matches_crc32fast() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i ^ (i >> 3)) as u8).collect();
        assert_eq!(crc32(&data), crc32fast::hash(&data));
    }
}

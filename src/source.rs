//! Buffered random-access byte source
//!
//! Wraps one large seekable stream (a disk image, a dump, a block device)
//! with a fixed read-ahead window. Scanning is overwhelmingly sequential
//! with short backward hops after a rejected match, so the window absorbs
//! almost every read and every small rewind.
//!
//! Invariant: `position == window_start + cursor`, where the window covers
//! `[window_start, window_start + filled)`. Any seek that leaves that range
//! invalidates the window and the next read refills it with an absolute
//! seek. Range extraction goes around the window on the raw handle and puts
//! the raw cursor back where the window left it.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::SourceError;

/// Default read-ahead window (one page)
pub const DEFAULT_WINDOW_SIZE: usize = 4096;

const MIN_WINDOW_SIZE: usize = 16;

/// Result of writing one extent to a destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Bytes written, trailer included
    pub bytes_written: u64,
    /// BLAKE3 of everything written, hex encoded
    pub blake3: String,
}

/// Buffered, seekable, sequential-biased reader
pub struct ByteSource<R> {
    inner: R,
    size: u64,
    position: u64,
    window: Vec<u8>,
    window_start: u64,
    filled: usize,
}

impl ByteSource<File> {
    /// Open a file (or block device) for scanning
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Self::open_with_window(path, DEFAULT_WINDOW_SIZE)
    }

    /// [`open`](Self::open) with a read-ahead window of `window_size` bytes
    pub fn open_with_window(path: &Path, window_size: usize) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::with_window(file, window_size)
    }
}

impl<R: Read + Seek> ByteSource<R> {
    pub fn new(inner: R) -> Result<Self, SourceError> {
        Self::with_window(inner, DEFAULT_WINDOW_SIZE)
    }

    /// Wrap `inner` with a read-ahead window of `window_size` bytes.
    ///
    /// Determines the total size by seeking to the end, rewinds to 0 and
    /// primes the window.
    pub fn with_window(mut inner: R, window_size: usize) -> Result<Self, SourceError> {
        let size = inner
            .seek(SeekFrom::End(0))
            .map_err(|source| SourceError::Seek { offset: 0, source })?;
        inner
            .seek(SeekFrom::Start(0))
            .map_err(|source| SourceError::Seek { offset: 0, source })?;

        let mut src = Self {
            inner,
            size,
            position: 0,
            window: vec![0u8; window_size.max(MIN_WINDOW_SIZE)],
            window_start: 0,
            filled: 0,
        };
        src.fill()?;

        tracing::debug!(size, window = src.window.len(), "Byte source ready");
        Ok(src)
    }

    /// Total stream size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current logical position
    pub fn tell(&self) -> u64 {
        self.position
    }

    pub fn remaining(&self) -> u64 {
        self.size - self.position
    }

    /// Copy up to `dst.len()` bytes, refilling the window as needed.
    ///
    /// Returns fewer bytes only at end of stream; `Ok(0)` means the stream
    /// is exhausted.
    pub fn read(&mut self, dst: &mut [u8]) -> Result<usize, SourceError> {
        let mut copied = 0;
        while copied < dst.len() {
            let cursor = self.cursor();
            if cursor >= self.filled {
                self.fill()?;
                if self.filled == 0 {
                    break;
                }
                continue;
            }

            let n = (dst.len() - copied).min(self.filled - cursor);
            dst[copied..copied + n].copy_from_slice(&self.window[cursor..cursor + n]);
            copied += n;
            self.position += n as u64;
        }
        Ok(copied)
    }

    /// Move the logical position by `delta` bytes.
    ///
    /// The target is clamped to `[0, size]`. Moving outside the buffered
    /// window invalidates it; the next read refills at the new position.
    pub fn seek(&mut self, delta: i64) {
        let target = if delta < 0 {
            let back = delta.unsigned_abs();
            if back > self.position {
                tracing::trace!(position = self.position, delta, "Rewind clamped at start of stream");
            }
            self.position.saturating_sub(back)
        } else {
            let forward = self.position.saturating_add(delta as u64);
            if forward > self.size {
                tracing::trace!(position = self.position, delta, "Seek clamped at end of stream");
            }
            forward.min(self.size)
        };
        self.reposition(target);
    }

    /// Absolute form of [`seek`](Self::seek)
    pub fn rewind_to(&mut self, offset: u64) {
        self.reposition(offset.min(self.size));
    }

    /// Copy `[start, end)` from the raw stream into `dest_path`, then append
    /// `trailer`. The window is left untouched.
    pub fn extract_range(
        &mut self,
        dest_path: &Path,
        start: u64,
        end: u64,
        trailer: &[u8],
    ) -> Result<Extraction, SourceError> {
        let file = File::create(dest_path).map_err(|source| SourceError::Create {
            path: dest_path.to_path_buf(),
            source,
        })?;

        let mut out = HashingWriter::new(BufWriter::new(file));
        let bytes_written = self.copy_range(start, end, trailer, &mut out)?;
        let (mut writer, blake3) = out.finish();
        writer
            .flush()
            .map_err(|source| SourceError::Write { source })?;

        Ok(Extraction {
            bytes_written,
            blake3,
        })
    }

    /// Writer-generic form of [`extract_range`](Self::extract_range).
    ///
    /// Reads in window-sized chunks so the range may be arbitrarily larger
    /// than the window. Stops early at end of stream. Returns the number of
    /// bytes written including the trailer.
    pub fn copy_range<W: Write>(
        &mut self,
        start: u64,
        end: u64,
        trailer: &[u8],
        writer: &mut W,
    ) -> Result<u64, SourceError> {
        if start > end {
            return Err(SourceError::InvalidRange { start, end });
        }

        let copied = self.copy_raw(start, end, writer);

        // Put the raw cursor back where the window's last refill left it,
        // on the error path too.
        let resume_at = self.window_start + self.filled as u64;
        let restored = self
            .inner
            .seek(SeekFrom::Start(resume_at))
            .map_err(|source| SourceError::Seek {
                offset: resume_at,
                source,
            });

        let copied = copied?;
        restored?;

        if copied < end - start {
            tracing::warn!(
                start,
                end,
                copied,
                "Extent runs past end of stream, artifact truncated"
            );
        }

        writer
            .write_all(trailer)
            .map_err(|source| SourceError::Write { source })?;

        Ok(copied + trailer.len() as u64)
    }

    fn copy_raw<W: Write>(&mut self, start: u64, end: u64, writer: &mut W) -> Result<u64, SourceError> {
        self.inner
            .seek(SeekFrom::Start(start))
            .map_err(|source| SourceError::Seek {
                offset: start,
                source,
            })?;

        let mut buf = vec![0u8; self.window.len()];
        let mut left = end - start;
        let mut copied = 0u64;

        while left > 0 {
            let want = left.min(buf.len() as u64) as usize;
            let n = match self.inner.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(SourceError::Read {
                        offset: start + copied,
                        source,
                    })
                }
            };
            writer
                .write_all(&buf[..n])
                .map_err(|source| SourceError::Write { source })?;
            left -= n as u64;
            copied += n as u64;
        }

        Ok(copied)
    }

    fn cursor(&self) -> usize {
        (self.position - self.window_start) as usize
    }

    fn reposition(&mut self, target: u64) {
        let window_end = self.window_start + self.filled as u64;
        if target < self.window_start || target > window_end {
            // Outside the buffered range: drop the window, refill lazily.
            self.window_start = target;
            self.filled = 0;
        }
        self.position = target;
    }

    /// Refill the window at the current position with an absolute seek.
    fn fill(&mut self) -> Result<(), SourceError> {
        self.window_start = self.position;
        self.filled = 0;

        let want = (self.size - self.position).min(self.window.len() as u64) as usize;
        if want == 0 {
            return Ok(());
        }

        self.inner
            .seek(SeekFrom::Start(self.position))
            .map_err(|source| SourceError::Seek {
                offset: self.position,
                source,
            })?;

        while self.filled < want {
            match self.inner.read(&mut self.window[self.filled..want]) {
                Ok(0) => break,
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(SourceError::Read {
                        offset: self.position + self.filled as u64,
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Tee every written byte into a BLAKE3 hasher
struct HashingWriter<W> {
    inner: W,
    hasher: blake3::Hasher,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
        }
    }

    fn finish(self) -> (W, String) {
        let hash = self.hasher.finalize();
        (self.inner, hex::encode(hash.as_bytes()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn source(data: &[u8], window: usize) -> ByteSource<Cursor<Vec<u8>>> {
        ByteSource::with_window(Cursor::new(data.to_vec()), window).unwrap()
    }

    #[test]
    fn test_accessors() {
        let mut src = source(&pattern(100), 32);
        assert_eq!(src.size(), 100);
        assert_eq!(src.tell(), 0);
        assert_eq!(src.remaining(), 100);

        let mut buf = [0u8; 10];
        src.read(&mut buf).unwrap();
        assert_eq!(src.tell(), 10);
        assert_eq!(src.remaining(), 90);
    }

    #[test]
    fn test_read_across_window_boundaries() {
        let data = pattern(1000);
        let mut src = source(&data, 16);

        let mut buf = vec![0u8; 333];
        assert_eq!(src.read(&mut buf).unwrap(), 333);
        assert_eq!(buf, data[..333]);

        let mut rest = vec![0u8; 1000];
        assert_eq!(src.read(&mut rest).unwrap(), 667);
        assert_eq!(rest[..667], data[333..]);
        assert_eq!(src.read(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_seek_back_inside_window() {
        let data = pattern(64);
        let mut src = source(&data, 32);

        let mut buf = [0u8; 4];
        src.read(&mut buf).unwrap();
        src.seek(-3);
        assert_eq!(src.tell(), 1);
        src.read(&mut buf).unwrap();
        assert_eq!(buf, data[1..5]);
    }

    #[test]
    fn test_seek_back_before_window_refills() {
        let data = pattern(200);
        let mut src = source(&data, 16);

        let mut buf = [0u8; 50];
        src.read(&mut buf).unwrap();
        src.seek(-45);
        assert_eq!(src.tell(), 5);

        let mut four = [0u8; 4];
        src.read(&mut four).unwrap();
        assert_eq!(four, data[5..9]);
    }

    #[test]
    fn test_seek_forward_past_window() {
        let data = pattern(500);
        let mut src = source(&data, 16);

        src.seek(300);
        let mut four = [0u8; 4];
        src.read(&mut four).unwrap();
        assert_eq!(four, data[300..304]);
    }

    #[test]
    fn test_seek_clamps_at_both_ends() {
        let mut src = source(&pattern(40), 16);

        src.seek(-10);
        assert_eq!(src.tell(), 0);

        src.seek(1_000);
        assert_eq!(src.tell(), 40);
        assert_eq!(src.remaining(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(src.read(&mut buf).unwrap(), 0);

        src.rewind_to(38);
        assert_eq!(src.read(&mut buf).unwrap(), 2);
    }

    #[test]
    fn test_empty_stream() {
        let mut src = source(&[], 16);
        assert_eq!(src.size(), 0);
        let mut buf = [0u8; 4];
        assert_eq!(src.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_copy_range_larger_than_window_with_trailer() {
        let data = pattern(300);
        let mut src = source(&data, 16);

        let mut out = Vec::new();
        let n = src.copy_range(10, 250, &[0xFF, 0xD9], &mut out).unwrap();
        assert_eq!(n, 242);
        assert_eq!(out[..240], data[10..250]);
        assert_eq!(out[240..], [0xFF, 0xD9]);
    }

    #[test]
    fn test_copy_range_does_not_disturb_scanning() {
        let data = pattern(300);
        let mut src = source(&data, 16);

        let mut buf = [0u8; 20];
        src.read(&mut buf).unwrap();

        let mut out = Vec::new();
        src.copy_range(100, 290, &[], &mut out).unwrap();

        // Both the buffered tail of the window and the next refill must
        // still come from the right offsets.
        let mut next = [0u8; 40];
        src.read(&mut next).unwrap();
        assert_eq!(next, data[20..60]);
    }

    #[test]
    fn test_copy_range_past_end_stops() {
        let data = pattern(50);
        let mut src = source(&data, 16);

        let mut out = Vec::new();
        let n = src.copy_range(40, 500, &[], &mut out).unwrap();
        assert_eq!(n, 10);
        assert_eq!(out, data[40..]);
    }

    #[test]
    fn test_copy_range_rejects_inverted_range() {
        let mut src = source(&pattern(50), 16);
        let mut out = Vec::new();
        assert!(matches!(
            src.copy_range(20, 10, &[], &mut out),
            Err(SourceError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_extract_range_to_file() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        let data = pattern(5000);
        std::fs::write(&input, &data).unwrap();

        let mut src = ByteSource::open(&input).unwrap();
        let dest = dir.path().join("out.bin");
        let extraction = src.extract_range(&dest, 1000, 4500, b"END").unwrap();

        let written = std::fs::read(&dest).unwrap();
        assert_eq!(extraction.bytes_written, 3503);
        assert_eq!(written.len(), 3503);
        assert_eq!(written[..3500], data[1000..4500]);
        assert_eq!(&written[3500..], b"END");
        assert_eq!(
            extraction.blake3,
            hex::encode(blake3::hash(&written).as_bytes())
        );
    }

    /// Accepts `budget` bytes, then fails every write
    struct FailingWriter {
        budget: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_copy_keeps_reads_consistent() {
        let data = pattern(200);
        let mut src = source(&data, 16);

        let mut buf = [0u8; 20];
        src.read(&mut buf).unwrap();

        let mut out = FailingWriter { budget: 30 };
        assert!(matches!(
            src.copy_range(50, 150, &[], &mut out),
            Err(SourceError::Write { .. })
        ));
        assert_eq!(src.tell(), 20);

        // First from the window, then across a refill
        let mut next = [0u8; 40];
        assert_eq!(src.read(&mut next).unwrap(), 40);
        assert_eq!(next, data[20..60]);
    }

    #[test]
    fn test_extract_range_to_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let data = pattern(100);
        let mut src = source(&data, 16);

        let mut buf = [0u8; 10];
        src.read(&mut buf).unwrap();

        // A directory cannot be created as a file
        let result = src.extract_range(dir.path(), 0, 50, &[]);
        assert!(matches!(result, Err(SourceError::Create { .. })));

        src.read(&mut buf).unwrap();
        assert_eq!(buf, data[10..20]);
    }

    #[test]
    fn test_open_with_window() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input.bin");
        let data = pattern(300);
        std::fs::write(&input, &data).unwrap();

        let mut src = ByteSource::open_with_window(&input, 32).unwrap();
        let mut buf = vec![0u8; 300];
        assert_eq!(src.read(&mut buf).unwrap(), 300);
        assert_eq!(buf, data);
    }

    #[test]
    fn test_open_missing_file() {
        let result = ByteSource::open(Path::new("/nonexistent/image.dd"));
        assert!(matches!(result, Err(SourceError::Open { .. })));
    }
}

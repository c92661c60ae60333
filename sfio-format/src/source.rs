use std::fmt;
use std::fs::File;
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::index::ByteRange;
use crate::{Error, Result};

/// Seekable, finite bytes backing a [`SimFile`](crate::SimFile).
///
/// Regular files are memory mapped; compressed files and in-memory buffers are held as a `Vec`.
pub enum ByteSource {
    Mapped(Mmap),
    Memory(Vec<u8>),
}

impl ByteSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ByteSource> {
        let path = path.as_ref();
        if is_gzip(path) {
            return read_gzip(path);
        }

        let file = File::open(path).map_err(|e| Error::ReadFailed(e, path.to_path_buf()))?;
        let len = file
            .metadata()
            .map_err(|e| Error::ReadFailed(e, path.to_path_buf()))?
            .len();

        // Zero-length maps are rejected on some platforms.
        if len == 0 {
            return Ok(ByteSource::Memory(Vec::new()));
        }

        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| Error::ReadFailed(e, path.to_path_buf()))?;
        tracing::debug!(path = %path.display(), bytes = len, "mapped source");
        Ok(ByteSource::Mapped(mmap))
    }

    #[inline(always)]
    pub fn from_bytes(bytes: Vec<u8>) -> ByteSource {
        ByteSource::Memory(bytes)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ByteSource::Mapped(mmap) => mmap,
            ByteSource::Memory(vec) => vec,
        }
    }

    #[inline(always)]
    pub fn len(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Bytes `[range.start, range.end())`.
    pub fn read(&self, range: ByteRange) -> Result<&[u8]> {
        let bytes = self.as_bytes();
        match range.checked_end() {
            Some(end) if end <= bytes.len() as u64 => Ok(&bytes[range.start as usize..end as usize]),
            _ => Err(Error::RangeOutOfBounds {
                range,
                len: bytes.len() as u64,
            }),
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ByteSource::Mapped(_) => "Mapped",
            ByteSource::Memory(_) => "Memory",
        };
        f.debug_struct("ByteSource")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

pub(crate) fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

#[cfg(feature = "gzip")]
fn read_gzip(path: &Path) -> Result<ByteSource> {
    use std::io::Read;

    let file = File::open(path).map_err(|e| Error::ReadFailed(e, path.to_path_buf()))?;
    let mut decoder = flate2::read::GzDecoder::new(std::io::BufReader::new(file));
    let mut buf = Vec::new();
    decoder
        .read_to_end(&mut buf)
        .map_err(|e| Error::ReadFailed(e, path.to_path_buf()))?;
    tracing::debug!(path = %path.display(), bytes = buf.len(), "decompressed gzip source");
    Ok(ByteSource::Memory(buf))
}

#[cfg(not(feature = "gzip"))]
fn read_gzip(_path: &Path) -> Result<ByteSource> {
    Err(Error::UnknownFormat("gz (built without the `gzip` feature)".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_ranges_within_bounds() {
        let source = ByteSource::from_bytes(b"hello world".to_vec());
        assert_eq!(source.read(ByteRange::new(6, 5)).unwrap(), b"world");
        assert_eq!(source.read(ByteRange::new(11, 0)).unwrap(), b"");
        assert!(source.read(ByteRange::new(6, 6)).is_err());
        assert!(source.read(ByteRange::new(u64::MAX, 1)).is_err());
    }

    #[test]
    fn opens_empty_and_mapped_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.dump");
        std::fs::write(&empty, b"").unwrap();
        assert!(ByteSource::open(&empty).unwrap().is_empty());

        let full = dir.path().join("full.dump");
        std::fs::write(&full, b"ITEM: TIMESTEP\n0\n").unwrap();
        let source = ByteSource::open(&full).unwrap();
        assert!(matches!(source, ByteSource::Mapped(_)));
        assert_eq!(source.len(), 17);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn decompresses_gzip_sources() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.dump.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b"ITEM: TIMESTEP\n0\n").unwrap();
        encoder.finish().unwrap();

        let source = ByteSource::open(&path).unwrap();
        assert_eq!(source.as_bytes(), b"ITEM: TIMESTEP\n0\n");
    }
}

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::SimFile;
use crate::format::{Format, Registry};
use crate::index::FrameIndex;
use crate::scan::{ScanMethod, ScanOptions};
use crate::source::ByteSource;
use crate::{Error, Result};

/// Scans slower than this are cached next to the source when caching is on.
pub const DEFAULT_CACHE_THRESHOLD: Duration = Duration::from_secs(8);

/// Options controlling how a [`SimFile`] is opened and indexed.
///
/// ```no_run
/// use sfio_format::{OpenOptions, ScanMethod};
///
/// let file = OpenOptions::new()
///     .format("lmpdump")
///     .method(ScanMethod::Line)
///     .index_cache(true)
///     .open("run/traj.lammpstrj")?;
/// # Ok::<(), sfio_format::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct OpenOptions {
    format: Option<String>,
    scan: ScanOptions,
    index_cache: bool,
    cache_threshold: Duration,
    registry: Registry,
}

impl Default for OpenOptions {
    fn default() -> Self {
        OpenOptions {
            format: None,
            scan: ScanOptions::default(),
            index_cache: false,
            cache_threshold: DEFAULT_CACHE_THRESHOLD,
            registry: Registry::builtin(),
        }
    }
}

impl OpenOptions {
    pub fn new() -> OpenOptions {
        OpenOptions::default()
    }

    /// Uses the named format instead of detecting it from the file name.
    pub fn format(&mut self, name: &str) -> &mut OpenOptions {
        self.format = Some(name.to_string());
        self
    }

    pub fn method(&mut self, method: ScanMethod) -> &mut OpenOptions {
        self.scan.method = method;
        self
    }

    /// Window size of the chunked scan, in bytes.
    pub fn chunk_size(&mut self, bytes: usize) -> &mut OpenOptions {
        self.scan.chunk_size = bytes.max(1);
        self
    }

    /// Reads and writes `_<file name>.cache` next to the source.
    pub fn index_cache(&mut self, enabled: bool) -> &mut OpenOptions {
        self.index_cache = enabled;
        self
    }

    pub fn cache_threshold(&mut self, threshold: Duration) -> &mut OpenOptions {
        self.cache_threshold = threshold;
        self
    }

    pub fn registry(&mut self, registry: Registry) -> &mut OpenOptions {
        self.registry = registry;
        self
    }

    fn resolve_format(&self, path: Option<&Path>) -> Result<Arc<dyn Format>> {
        match (&self.format, path) {
            (Some(name), _) => self.registry.by_name(name),
            (None, Some(path)) => self.registry.detect(path),
            (None, None) => Err(Error::UndetectableFormat(PathBuf::from("<memory>"))),
        }
    }

    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<SimFile> {
        let path = path.as_ref();
        let format = self.resolve_format(Some(path))?;
        let source = ByteSource::open(path)?;

        let cache = cache_path(path);
        let cached = match (&cache, self.index_cache) {
            (Some(cache), true) => load_cache(cache, path, format.name(), source.len()),
            _ => None,
        };

        let index = match cached {
            Some(index) => index,
            None => {
                let started = Instant::now();
                let index = format.scan(source.as_bytes(), &self.scan)?;
                let elapsed = started.elapsed();
                tracing::debug!(
                    path = %path.display(),
                    frames = index.len(),
                    elapsed = ?elapsed,
                    "indexed file"
                );
                if let (Some(cache), true) = (&cache, self.index_cache) {
                    if elapsed >= self.cache_threshold {
                        write_cache(cache, &index);
                    }
                }
                index
            }
        };

        Ok(SimFile {
            path: Some(path.to_path_buf()),
            source,
            index,
            format,
        })
    }

    /// Indexes an in-memory buffer. A format must be set.
    pub fn open_bytes(&self, bytes: Vec<u8>) -> Result<SimFile> {
        let format = self.resolve_format(None)?;
        let source = ByteSource::from_bytes(bytes);
        let index = format.scan(source.as_bytes(), &self.scan)?;
        Ok(SimFile {
            path: None,
            source,
            index,
            format,
        })
    }
}

/// `dir/_<file name>.cache` for `dir/<file name>`.
pub fn cache_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    Some(path.with_file_name(format!("_{}.cache", name)))
}

fn load_cache(cache: &Path, source: &Path, format: &str, len: u64) -> Option<FrameIndex> {
    let modified = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (modified(cache), modified(source)) {
        (Some(c), Some(s)) if c >= s => {}
        (Some(_), _) => {
            tracing::info!(cache = %cache.display(), "index cache is older than its source, rescanning");
            return None;
        }
        (None, _) => return None,
    }

    let file = File::open(cache).ok()?;
    let index: FrameIndex = match serde_json::from_reader(BufReader::new(file)) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!(cache = %cache.display(), error = %e, "unreadable index cache, rescanning");
            return None;
        }
    };

    if index.format() != format || index.source_len() != len {
        tracing::info!(cache = %cache.display(), "index cache does not match its source, rescanning");
        return None;
    }
    if !index.is_consistent() {
        tracing::warn!(cache = %cache.display(), "index cache has invalid byte ranges, rescanning");
        return None;
    }
    tracing::info!(cache = %cache.display(), frames = index.len(), "loaded index cache");
    Some(index)
}

fn write_cache(cache: &Path, index: &FrameIndex) {
    let result = File::create(cache)
        .map_err(|e| e.to_string())
        .and_then(|f| serde_json::to_writer(std::io::BufWriter::new(f), index).map_err(|e| e.to_string()));
    match result {
        Ok(()) => tracing::info!(cache = %cache.display(), frames = index.len(), "wrote index cache"),
        Err(e) => tracing::warn!(cache = %cache.display(), error = %e, "failed to write index cache"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ByteRange;

    const DUMP: &str = "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n1\nITEM: BOX BOUNDS pp pp pp\n0 1\n0 1\n0 1\nITEM: ATOMS id x\n1 0.5\n";

    #[test]
    fn cache_lives_next_to_the_source() {
        assert_eq!(
            cache_path(Path::new("/data/run.dump")).unwrap(),
            PathBuf::from("/data/_run.dump.cache")
        );
    }

    #[test]
    fn writes_and_reuses_the_index_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dump");
        std::fs::write(&path, DUMP.repeat(3)).unwrap();

        let mut options = OpenOptions::new();
        options.index_cache(true).cache_threshold(Duration::from_secs(0));
        let first = options.open(&path).unwrap();
        let cache = cache_path(&path).unwrap();
        assert!(cache.exists());

        let second = options.open(&path).unwrap();
        assert_eq!(first.index(), second.index());
        assert_eq!(second.len(), 3);
    }

    #[test]
    fn stale_cache_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dump");
        std::fs::write(&path, DUMP.repeat(2)).unwrap();

        let mut wrong = FrameIndex {
            format: "lmpdump".into(),
            source_len: 7,
            preamble: Vec::new(),
            frames: Vec::new(),
        };
        write_cache(&cache_path(&path).unwrap(), &wrong);
        let file = OpenOptions::new().index_cache(true).open(&path).unwrap();
        assert_eq!(file.len(), 2);

        wrong.format = "lmpdata".into();
        write_cache(&cache_path(&path).unwrap(), &wrong);
        assert!(load_cache(&cache_path(&path).unwrap(), &path, "lmpdump", 7).is_none());
    }

    #[test]
    fn corrupt_cache_ranges_are_rescanned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.dump");
        std::fs::write(&path, DUMP.repeat(2)).unwrap();
        let len = (DUMP.len() * 2) as u64;

        let mut options = OpenOptions::new();
        options.index_cache(true).cache_threshold(Duration::from_secs(0));
        let good = options.open(&path).unwrap();
        let cache = cache_path(&path).unwrap();

        let mut corrupt = good.index().clone();
        corrupt.frames[1].range = ByteRange::new(u64::MAX - 1, 10);
        corrupt.frames[1].sections[0].range = ByteRange::new(u64::MAX - 1, 10);
        write_cache(&cache, &corrupt);
        assert!(load_cache(&cache, &path, "lmpdump", len).is_none());

        let file = options.open(&path).unwrap();
        assert_eq!(file.index(), good.index());
        assert_eq!(file.get(1).unwrap().raw().unwrap(), DUMP.as_bytes());
    }

    #[test]
    fn bytes_need_an_explicit_format() {
        let err = OpenOptions::new().open_bytes(DUMP.as_bytes().to_vec()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Format);
        let file = OpenOptions::new()
            .format("lmpdump")
            .method(ScanMethod::Line)
            .open_bytes(DUMP.as_bytes().to_vec())
            .unwrap();
        assert_eq!(file.len(), 1);
        assert!(file.path().is_none());
    }
}

//! Tests for indexing trajectory files on disk.
//!
//! These tests verify that frames selected by index, slice or index list behave like
//! the same selection on an eagerly built list, and that sections are located and cast
//! lazily from the scanned byte ranges.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sfio_format::{
    Column, ErrorKind, OpenOptions, ScanMethod, Selector, SimFile, Slice, Value,
};
use tempfile::TempDir;

/// Helper to render a dump trajectory with `frames` frames of two atoms each
fn dump(frames: usize) -> String {
    (0..frames)
        .map(|f| {
            format!(
                "ITEM: TIMESTEP\n{ts}\nITEM: NUMBER OF ATOMS\n2\n\
                 ITEM: BOX BOUNDS pp pp pp\n0 10\n0 20\n0 30\n\
                 ITEM: ATOMS id type x y z\n2 1 {f}.5 0 0\n1 1 {f}.0 0 0\n",
                ts = f * 100,
                f = f,
            )
        })
        .collect()
}

/// Helper to write `contents` into a fresh temp dir and return the dir + file path
fn write_file(name: &str, contents: &[u8]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    (temp_dir, path)
}

fn timesteps(frames: &[sfio_format::Frame<'_>]) -> Vec<i64> {
    frames
        .iter()
        .map(|f| f.record().unwrap().get("timestep").and_then(Value::as_i64).unwrap())
        .collect()
}

/// Test the four frame trajectory scenario: length, negative index, slice, bad index list
#[test]
fn test_four_frame_trajectory() {
    let (_temp_dir, path) = write_file("traj.lammpstrj", dump(4).as_bytes());
    let file = SimFile::open(&path).unwrap();

    assert_eq!(file.len(), 4);
    assert_eq!(file.format().name(), "lmpdump");
    assert_eq!(file.get(-1).unwrap(), file.get(3).unwrap());
    assert_eq!(file.slice(..3).unwrap().len(), 3);

    let err = file.take(&[1, 5, 9]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
    assert_eq!(file.get(4).unwrap_err().kind(), ErrorKind::Index);
    assert_eq!(file.get(-5).unwrap_err().kind(), ErrorKind::Index);
}

/// Test that slices follow list semantics, including clamping and negative steps
#[test]
fn test_slices_match_list_semantics() {
    let file = SimFile::from_bytes(dump(4).into_bytes(), "lmpdump").unwrap();
    let eager: Vec<i64> = vec![0, 100, 200, 300];

    let cases: &[(&str, Vec<usize>)] = &[
        (":", vec![0, 1, 2, 3]),
        ("::-1", vec![3, 2, 1, 0]),
        ("1::2", vec![1, 3]),
        ("-3:-1", vec![1, 2]),
        ("::-2", vec![3, 1]),
        ("2:0:-1", vec![2, 1]),
        ("10:", vec![]),
        (":-10", vec![]),
        ("-100:100", vec![0, 1, 2, 3]),
        ("3:1", vec![]),
    ];
    for (text, positions) in cases {
        let selector: Selector = text.parse().unwrap();
        let expected: Vec<i64> = positions.iter().map(|&i| eager[i]).collect();
        assert_eq!(timesteps(&file.select(&selector).unwrap()), expected, "slice {}", text);
    }

    let err = file.slice(Slice::new(None, None, Some(0))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Index);
}

/// Test that index lists keep their order and duplicates
#[test]
fn test_index_lists_keep_order_and_duplicates() {
    let file = SimFile::from_bytes(dump(4).into_bytes(), "lmpdump").unwrap();

    let frames = file.take(&[3, 0, -1, 0]).unwrap();
    assert_eq!(timesteps(&frames), vec![300, 0, 300, 0]);
    assert_eq!(frames[0], frames[2]);

    let selector: Selector = "2,1,2".parse().unwrap();
    assert_eq!(timesteps(&file.select(&selector).unwrap()), vec![200, 100, 200]);
}

/// Test that steps too large to add to an index select only the first element
#[test]
fn test_huge_slice_steps() {
    let file = SimFile::from_bytes(dump(4).into_bytes(), "lmpdump").unwrap();

    let frames = file.slice(Slice::new(Some(1), None, Some(isize::MAX))).unwrap();
    assert_eq!(timesteps(&frames), vec![100]);
    let frames = file.slice(Slice::new(Some(isize::MIN), None, Some(isize::MAX))).unwrap();
    assert_eq!(timesteps(&frames), vec![0]);
    let frames = file.slice(Slice::new(None, None, Some(isize::MIN))).unwrap();
    assert_eq!(timesteps(&frames), vec![300]);
}

/// Test that the line and chunk scans build the same index
#[test]
fn test_line_and_chunk_scans_agree() {
    let (_temp_dir, path) = write_file("traj.dump", dump(6).as_bytes());

    let by_line = OpenOptions::new().method(ScanMethod::Line).open(&path).unwrap();
    for chunk in [1, 7, 64, 4096] {
        let by_chunk = OpenOptions::new()
            .method(ScanMethod::Chunk)
            .chunk_size(chunk)
            .open(&path)
            .unwrap();
        assert_eq!(by_chunk.index(), by_line.index(), "chunk size {}", chunk);
    }
}

/// Test section lookup in one frame and across the whole file
#[test]
fn test_section_lookup() {
    let file = SimFile::from_bytes(dump(3).into_bytes(), "lmpdump").unwrap();

    let atoms = file.section("atoms").unwrap();
    assert_eq!(atoms.len(), 3);
    let frames: Vec<Option<usize>> = atoms.into_vec().iter().map(|s| s.frame_index()).collect();
    assert_eq!(frames, vec![Some(0), Some(1), Some(2)]);

    let frame = file.get(1).unwrap();
    let bounds = frame.section("box").unwrap().one().unwrap();
    assert!(bounds.text().unwrap().starts_with("ITEM: BOX BOUNDS"));
    assert!(frame.range().contains(&bounds.range()));

    let err = frame.section("velocities").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Lookup);
    assert_eq!(file.section("velocities").unwrap_err().kind(), ErrorKind::Lookup);
}

/// Test that casting twice hands back the cached value
#[test]
fn test_casts_are_cached() {
    let file = SimFile::from_bytes(dump(2).into_bytes(), "lmpdump").unwrap();
    let frame = file.get(1).unwrap();

    let first = frame.record().unwrap();
    let second = frame.record().unwrap();
    assert!(std::ptr::eq(first, second));
    assert!(std::ptr::eq(frame.table().unwrap(), frame.table().unwrap()));
    assert!(std::ptr::eq(frame.text().unwrap(), frame.text().unwrap()));

    let table = frame.table().unwrap();
    assert_eq!(table.column("id"), Some(&Column::Int(vec![1, 2])));
    assert_eq!(table.column("x"), Some(&Column::Float(vec![1.0, 1.5])));
    assert_eq!(table.meta().get("timestep").and_then(Value::as_i64), Some(100));
    assert!(table.meta().get("x").is_none());
}

/// Test that an empty file has no frames
#[test]
fn test_empty_file() {
    let (_temp_dir, path) = write_file("empty.lammpstrj", b"");
    let file = SimFile::open(&path).unwrap();

    assert!(file.is_empty());
    assert_eq!(file.get(0).unwrap_err().kind(), ErrorKind::Index);
    assert!(file.slice(..).unwrap().is_empty());
    assert_eq!(file.section("atoms").unwrap_err().kind(), ErrorKind::Lookup);
}

/// Test that undecodable bytes only fail the section that holds them
#[test]
fn test_invalid_text_fails_one_section() {
    let mut data = dump(2).into_bytes();
    let at = data.len() - 3;
    data[at] = 0xff;
    let file = SimFile::from_bytes(data, "lmpdump").unwrap();

    assert!(file.get(0).unwrap().text().is_ok());
    let err = file.get(1).unwrap().text().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Encoding);
    assert!(file.get(1).unwrap().raw().is_ok());
}

/// Test that files without a known name or extension need an explicit format
#[test]
fn test_format_detection() {
    let (_temp_dir, path) = write_file("trajectory.xyz123", dump(1).as_bytes());

    let err = SimFile::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    let err = OpenOptions::new().format("nope").open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let file = OpenOptions::new().format("lmpdump").open(&path).unwrap();
    assert_eq!(file.len(), 1);
}

/// Test that a malformed file is rejected as a whole
#[test]
fn test_malformed_structure_aborts_indexing() {
    let text = format!("garbage line\n{}", dump(2));
    let err = SimFile::from_bytes(text.into_bytes(), "lmpdump").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
}

fn cache_file(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap().to_str().unwrap();
    path.with_file_name(format!("_{}.cache", name))
}

/// Test that a slow scan leaves an index cache that later opens reuse
#[test]
fn test_index_cache_is_written_and_reused() {
    let (_temp_dir, path) = write_file("cached.lammpstrj", dump(5).as_bytes());

    let mut options = OpenOptions::new();
    options.index_cache(true).cache_threshold(Duration::ZERO);

    let first = options.open(&path).unwrap();
    assert!(cache_file(&path).exists());

    let second = options.open(&path).unwrap();
    assert_eq!(second.index(), first.index());
    assert_eq!(second.get(-1).unwrap().table().unwrap().num_rows(), 2);

    let uncached = SimFile::open(&path).unwrap();
    assert_eq!(uncached.index(), first.index());
}

/// Test that caching stays off unless asked for
#[test]
fn test_index_cache_is_opt_in() {
    let (_temp_dir, path) = write_file("plain.lammpstrj", dump(2).as_bytes());

    OpenOptions::new().cache_threshold(Duration::ZERO).open(&path).unwrap();
    assert!(!cache_file(&path).exists());
}

/// Test reading a gzip compressed trajectory
#[cfg(feature = "gzip")]
#[test]
fn test_gzip_source() {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(dump(3).as_bytes()).unwrap();
    let (_temp_dir, path) = write_file("traj.lammpstrj.gz", &encoder.finish().unwrap());

    let file = SimFile::open(&path).unwrap();
    assert_eq!(file.format().name(), "lmpdump");
    assert_eq!(file.len(), 3);
    assert_eq!(
        file.get(2).unwrap().record().unwrap().get("timestep").and_then(Value::as_i64),
        Some(200)
    );
}

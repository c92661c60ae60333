//! Tests for copying frames between formats.
//!
//! These tests verify that a frame read from one format can be written as a LAMMPS dump
//! and read back with the same atoms and the same box.

use sfio_format::{BoxType, Column, DumpWriter, ErrorKind, SimBox, SimFile, Value};
use tempfile::TempDir;

const POSCAR: &str = "Tilted cell\n\
    1.0\n\
    5.0 0.0 0.0\n\
    1.0 6.0 0.0\n\
    0.0 0.5 7.0\n\
    Si C\n\
    1 2\n\
    Cartesian\n\
    0.5 0.5 0.5\n\
    1.5 2.0 2.5\n\
    3.0 3.5 4.0\n";

/// Helper to write the POSCAR fixture into a fresh temp dir
fn create_poscar() -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("POSCAR");
    std::fs::write(&path, POSCAR).unwrap();
    (temp_dir, path)
}

fn box_of(frame: &sfio_format::Frame<'_>) -> SimBox {
    let record = frame.record().unwrap();
    let input = record.get("box").and_then(Value::as_record).unwrap();
    SimBox::from_record(input).unwrap()
}

/// Test copying a POSCAR configuration into a dump file
#[test]
fn test_poscar_to_dump() {
    let (temp_dir, path) = create_poscar();
    let poscar = SimFile::open(&path).unwrap();
    assert_eq!(poscar.format().name(), "poscar");
    assert_eq!(poscar.len(), 1);

    let dump_path = temp_dir.path().join("copy.lammpstrj");
    let mut writer = DumpWriter::create(&dump_path).unwrap();
    writer.copy_frame(&poscar.get(0).unwrap()).unwrap();
    writer.copy_frame(&poscar.get(-1).unwrap()).unwrap();
    let bytes = writer.finish().unwrap();
    assert_eq!(bytes, std::fs::metadata(&dump_path).unwrap().len());

    let dump = SimFile::open(&dump_path).unwrap();
    assert_eq!(dump.len(), 2);

    let original = poscar.get(0).unwrap();
    let copied = dump.get(1).unwrap();
    let (atoms, copy) = (original.table().unwrap(), copied.table().unwrap());
    assert_eq!(copy.column("id"), Some(&Column::Int(vec![1, 2, 3])));
    assert_eq!(
        copy.column("element"),
        Some(&Column::Str(vec!["Si".into(), "C".into(), "C".into()]))
    );
    for axis in ["x", "y", "z"] {
        assert_eq!(copy.column(axis), atoms.column(axis), "column {}", axis);
    }

    let (a, b) = (box_of(&original), box_of(&copied));
    for (x, y) in a.to_repr(BoxType::Basis).iter().zip(b.to_repr(BoxType::Basis)) {
        assert!((x - y).abs() < 1e-9);
    }
    assert!(b.input().allow_tilt);
}

/// Test that the writer never overwrites an existing file
#[test]
fn test_dump_writer_refuses_existing_file() {
    let (_temp_dir, path) = create_poscar();
    let err = DumpWriter::create(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), POSCAR);
}

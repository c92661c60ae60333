//! VASP POSCAR/CONTCAR structures. The layout is positional, so sections are found by
//! counting lines instead of matching markers.

use nalgebra::Matrix3;

use super::{merge_frame, parse_num, Format};
use crate::file::{Section, FRAME};
use crate::index::{FrameIndex, IndexBuilder};
use crate::scan::{self, ScanOptions};
use crate::simbox::{BoxType, SimBox};
use crate::value::{Column, Record, Value};
use crate::{Error, Result};

const NAME: &str = "poscar";

/// VASP structure file, one frame per file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Poscar;

impl Format for Poscar {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["poscar", "vasp"]
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["POSCAR", "CONTCAR"]
    }

    fn scan(&self, data: &[u8], _options: &ScanOptions) -> Result<FrameIndex> {
        let mut builder = IndexBuilder::new(NAME, data.len() as u64);
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(builder.finish());
        }

        let lines: Vec<(usize, &[u8])> = scan::lines(data).collect();
        let offset = |i: usize| lines.get(i).map(|(at, _)| *at as u64).unwrap_or(data.len() as u64);
        let line = |i: usize| -> Result<&str> {
            let (at, bytes) = lines.get(i).ok_or_else(|| {
                Error::malformed(NAME, data.len() as u64, format!("file ends before line {}", i + 1))
            })?;
            std::str::from_utf8(bytes)
                .map(str::trim)
                .map_err(|_| Error::malformed(NAME, *at as u64, "line is not valid UTF-8"))
        };

        builder.start_frame(0)?;
        builder.start_section("comment", 0)?;
        builder.start_section("lattice", offset(1))?;
        line(4)?;

        let mut i = 5;
        builder.start_section("species", offset(i))?;
        if line(i)?.split_whitespace().next().map_or(false, |t| t.parse::<f64>().is_err()) {
            i += 1;
        }
        let counts = line(i)?
            .split_whitespace()
            .map(|t| t.parse::<usize>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .ok()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::malformed(NAME, offset(i), "invalid species counts"))?;
        i += 1;

        builder.start_section("coordinates", offset(i))?;
        if line(i)?.starts_with(|c: char| c == 'S' || c == 's') {
            i += 1;
        }
        if mode(line(i)?).is_none() {
            return Err(Error::malformed(NAME, offset(i), "expected Direct or Cartesian"));
        }
        i += 1;
        let overflow = || Error::malformed(NAME, offset(i), "species counts overflow");
        let atoms = counts
            .iter()
            .try_fold(0usize, |sum, n| sum.checked_add(*n))
            .ok_or_else(overflow)?;
        let end = i.checked_add(atoms).ok_or_else(overflow)?;
        if atoms > 0 {
            line(end - 1)?;
        }
        builder.end_section(offset(end))?;
        Ok(builder.finish())
    }

    fn cast(&self, section: &Section<'_>) -> Result<Record> {
        match section.name() {
            FRAME => merge_frame(section, |s, _| match s.name() {
                "coordinates" => Some("atoms".to_string()),
                _ => None,
            }),
            "comment" => {
                let mut record = Record::new();
                record.insert("comment", section.text()?.trim());
                Ok(record)
            }
            "lattice" => lattice(section.text()?),
            "species" => species(section.text()?),
            "coordinates" => {
                let sibling = section.sibling("species")?;
                coordinates(section.text()?, sibling.record()?)
            }
            other => Err(Error::cast(NAME, other, "unknown section")),
        }
    }

    fn table_key(&self, section: &str) -> Option<&'static str> {
        match section {
            FRAME => Some("atoms"),
            _ => None,
        }
    }
}

fn mode(line: &str) -> Option<&'static str> {
    match line.chars().next()? {
        'D' | 'd' => Some("direct"),
        'C' | 'c' | 'K' | 'k' => Some("cartesian"),
        _ => None,
    }
}

fn floats(section: &'static str, line: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|t| parse_num::<f64>(NAME, section, Some(t), "number"))
        .collect()
}

/// Scale line and three basis rows. A negative scale is the target cell volume.
fn lattice(text: &str) -> Result<Record> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let scale = floats("lattice", lines.next().unwrap_or(""))?;

    let mut v = Vec::with_capacity(9);
    for _ in 0..3 {
        let row = floats("lattice", lines.next().unwrap_or(""))?;
        if row.len() < 3 {
            return Err(Error::cast(NAME, "lattice", "basis rows need 3 values"));
        }
        v.extend_from_slice(&row[..3]);
    }

    match scale.as_slice() {
        [s] if *s < 0.0 => {
            let det = Matrix3::from_row_slice(&v).determinant().abs();
            if det == 0.0 {
                return Err(Error::cast(NAME, "lattice", "basis vectors are coplanar"));
            }
            let factor = (-s / det).cbrt();
            v.iter_mut().for_each(|x| *x *= factor);
        }
        [s] => v.iter_mut().for_each(|x| *x *= s),
        [sx, sy, sz] => {
            for row in v.chunks_mut(3) {
                row[0] *= sx;
                row[1] *= sy;
                row[2] *= sz;
            }
        }
        _ => return Err(Error::cast(NAME, "lattice", "scale line needs 1 or 3 values")),
    }

    let mut simbox = SimBox::new();
    simbox
        .set_input(&v, Some(BoxType::Basis))
        .map_err(|e| Error::cast(NAME, "lattice", e.to_string()))?;

    let mut record = Record::new();
    record.insert("scale", scale[0]);
    record.insert("box", simbox.input().to_record());
    Ok(record)
}

fn species(text: &str) -> Result<Record> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let mut record = Record::new();
    let counts_line = match lines.as_slice() {
        [names, counts, ..] if names.split_whitespace().all(|t| t.parse::<f64>().is_err()) => {
            record.insert(
                "elements",
                Column::Str(names.split_whitespace().map(str::to_string).collect()),
            );
            *counts
        }
        [counts, ..] => *counts,
        [] => return Err(Error::cast(NAME, "species", "missing species counts")),
    };
    let counts = counts_line
        .split_whitespace()
        .map(|t| parse_num::<i64>(NAME, "species", Some(t), "count"))
        .collect::<Result<Vec<_>>>()?;
    record.insert("counts", Column::Int(counts));
    Ok(record)
}

/// Coordinates are kept as written; `mode` tells whether they are fractional.
fn coordinates(text: &str, species: &Record) -> Result<Record> {
    let counts = match species.get("counts").and_then(Value::as_array) {
        Some(Column::Int(c)) => c.clone(),
        _ => return Err(Error::cast(NAME, "coordinates", "species counts unavailable")),
    };
    let elements = match species.get("elements").and_then(Value::as_array) {
        Some(Column::Str(e)) => Some(e.clone()),
        _ => None,
    };

    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    let mut first = lines.next().unwrap_or("");
    let selective = first.starts_with(|c: char| c == 'S' || c == 's');
    if selective {
        first = lines.next().unwrap_or("");
    }
    let mode = mode(first).ok_or_else(|| Error::cast(NAME, "coordinates", "expected Direct or Cartesian"))?;

    let mut types = Vec::new();
    let mut names = Vec::new();
    for (t, n) in counts.iter().enumerate() {
        for _ in 0..*n {
            types.push(t as i64 + 1);
            if let Some(e) = &elements {
                names.push(e.get(t).cloned().unwrap_or_default());
            }
        }
    }

    let mut xyz = [Vec::new(), Vec::new(), Vec::new()];
    let mut flags = [Vec::new(), Vec::new(), Vec::new()];
    for n in 0..types.len() {
        let line = lines.next().ok_or_else(|| {
            Error::cast(NAME, "coordinates", format!("expected {} atoms, found {}", types.len(), n))
        })?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let need = if selective { 6 } else { 3 };
        if tokens.len() < need {
            return Err(Error::cast(NAME, "coordinates", format!("atom {} needs {} values", n + 1, need)));
        }
        for j in 0..3 {
            xyz[j].push(parse_num::<f64>(NAME, "coordinates", Some(tokens[j]), "coordinate")?);
            if selective {
                flags[j].push(tokens[3 + j].to_string());
            }
        }
    }

    let mut record = Record::new();
    record.insert("mode", mode);
    record.insert("selective", selective);
    record.insert("type", Column::Int(types));
    if elements.is_some() {
        record.insert("element", Column::Str(names));
    }
    let [x, y, z] = xyz;
    record.insert("x", Column::Float(x));
    record.insert("y", Column::Float(y));
    record.insert("z", Column::Float(z));
    if selective {
        let [sx, sy, sz] = flags;
        record.insert("sx", Column::Str(sx));
        record.insert("sy", Column::Str(sy));
        record.insert("sz", Column::Str(sz));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SimFile;

    const POSCAR: &str = "Rutile TiO2\n\
        1.0\n\
        4.59 0.0 0.0\n\
        0.0 4.59 0.0\n\
        0.0 0.0 2.96\n\
        Ti O\n\
        2 4\n\
        Selective dynamics\n\
        Direct\n\
        0.0 0.0 0.0 T T T\n\
        0.5 0.5 0.5 T T F\n\
        0.3 0.3 0.0 F F F\n\
        0.7 0.7 0.0 T T T\n\
        0.8 0.2 0.5 T T T\n\
        0.2 0.8 0.5 T T T\n\
        \n\
        0.0 0.0 0.0\n";

    #[test]
    fn sections_follow_line_layout() {
        let file = SimFile::from_bytes(POSCAR.as_bytes().to_vec(), NAME).unwrap();
        assert_eq!(file.len(), 1);
        let frame = file.get(0).unwrap();
        let names: Vec<&str> = frame.sections().unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["comment", "lattice", "species", "coordinates"]);

        let coords = file.section("coordinates").unwrap().first();
        assert!(coords.text().unwrap().ends_with("0.2 0.8 0.5 T T T\n"));
    }

    #[test]
    fn frame_record_and_table() {
        let file = SimFile::from_bytes(POSCAR.as_bytes().to_vec(), NAME).unwrap();
        let frame = file.get(0).unwrap();
        let record = frame.record().unwrap();
        assert_eq!(record.get("comment").and_then(Value::as_str), Some("Rutile TiO2"));

        let simbox = SimBox::from_nested(record, "box").unwrap().unwrap();
        assert!((simbox.input().lz - 2.96).abs() < 1e-12);

        let table = frame.table().unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(table.column("type"), Some(&Column::Int(vec![1, 1, 2, 2, 2, 2])));
        assert_eq!(table.row(1).unwrap().get("element").and_then(Value::as_str), Some("Ti"));
        assert_eq!(table.row(1).unwrap().get("sz").and_then(Value::as_str), Some("F"));
        assert_eq!(table.meta().get("counts").and_then(Value::as_array), Some(&Column::Int(vec![2, 4])));
    }

    #[test]
    fn negative_scale_is_a_volume() {
        let r = lattice("-64\n1 0 0\n0 2 0\n0 0 4\n").unwrap();
        let simbox = SimBox::from_nested(&r, "box").unwrap().unwrap();
        let input = simbox.input();
        assert!((input.lx * input.ly * input.lz - 64.0).abs() < 1e-9);
        assert!((input.lx - 2.0).abs() < 1e-9);

        assert!(lattice("1 2\n1 0 0\n0 1 0\n0 0 1\n").is_err());
        assert!(lattice("-1\n1 0 0\n2 0 0\n0 0 1\n").is_err());
    }

    #[test]
    fn counts_without_element_names() {
        let text = "bcc Fe\n2.87\n1 0 0\n0 1 0\n0 0 1\n2\nCartesian\n0 0 0\n1.435 1.435 1.435\n";
        let file = SimFile::from_bytes(text.as_bytes().to_vec(), NAME).unwrap();
        let frame = file.get(0).unwrap();
        let table = frame.table().unwrap();
        assert_eq!(table.column("element"), None);
        assert_eq!(table.column("x"), Some(&Column::Float(vec![0.0, 1.435])));
        assert_eq!(table.meta().get("scale").and_then(Value::as_f64), Some(2.87));
    }

    #[test]
    fn truncated_structures_are_malformed() {
        let err = SimFile::from_bytes(b"title\n1.0\n1 0 0\n".to_vec(), NAME).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        let text = "t\n1\n1 0 0\n0 1 0\n0 0 1\n3\nDirect\n0 0 0\n";
        assert!(SimFile::from_bytes(text.as_bytes().to_vec(), NAME).is_err());
        assert!(SimFile::from_bytes(b"\n\n".to_vec(), NAME).unwrap().is_empty());
    }

    #[test]
    fn oversized_species_counts_are_malformed() {
        let text = format!("t\n1\n1 0 0\n0 1 0\n0 0 1\n{} 1\nDirect\n0 0 0\n", usize::MAX);
        let err = SimFile::from_bytes(text.into_bytes(), NAME).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
        assert_eq!(err.kind(), crate::ErrorKind::Format);

        let text = format!("t\n1\n1 0 0\n0 1 0\n0 0 1\n{}\nDirect\n0 0 0\n", usize::MAX);
        let err = SimFile::from_bytes(text.into_bytes(), NAME).unwrap_err();
        assert!(matches!(err, Error::Malformed { .. }));
    }
}

use super::{merge_frame, parse_num, Format};
use crate::file::{Section, FRAME};
use crate::index::FrameIndex;
use crate::scan::{self, Grammar, Marker, Pattern, ScanOptions};
use crate::simbox::{BoxType, SimBox};
use crate::value::{parse_columns, Record, Table};
use crate::{Error, Result};

const NAME: &str = "lmpdump";

const GRAMMAR: Grammar = Grammar {
    frame: Some(Pattern::Prefix(b"ITEM: TIMESTEP")),
    leading: Some("header"),
    markers: &[
        Marker {
            section: "box",
            pattern: Pattern::Prefix(b"ITEM: BOX BOUNDS"),
        },
        Marker {
            section: "atoms",
            pattern: Pattern::Prefix(b"ITEM: ATOMS"),
        },
    ],
    required: &["header", "box", "atoms"],
};

/// LAMMPS dump file: snapshots of the box and per-atom values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LmpDump;

impl Format for LmpDump {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["dump", "lammpstrj"]
    }

    fn scan(&self, data: &[u8], options: &ScanOptions) -> Result<FrameIndex> {
        scan::build(data, NAME, &GRAMMAR, options)
    }

    fn cast(&self, section: &Section<'_>) -> Result<Record> {
        match section.name() {
            FRAME => merge_frame(section, |s, _| match s.name() {
                "header" => None,
                name => Some(name.to_string()),
            }),
            "header" => header(section.text()?),
            "box" => bounds(section.text()?),
            "atoms" => atoms(section.text()?),
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

fn header(text: &str) -> Result<Record> {
    let mut record = Record::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let mut value = || lines.next().and_then(|l| l.split_whitespace().next());
        if line.starts_with("ITEM: TIMESTEP") {
            let timestep: i64 = parse_num(NAME, "header", value(), "timestep")?;
            record.insert("timestep", timestep);
        } else if line.starts_with("ITEM: NUMBER OF ATOMS") {
            let count: i64 = parse_num(NAME, "header", value(), "number of atoms")?;
            record.insert("num_atoms", count);
        }
    }
    Ok(record)
}

/// `ITEM: BOX BOUNDS [xy xz yz] bx by bz` followed by one line per axis.
fn bounds(text: &str) -> Result<Record> {
    let mut lines = text.lines();
    let item = lines
        .next()
        .and_then(|l| l.strip_prefix("ITEM: BOX BOUNDS"))
        .unwrap_or("");
    let tokens: Vec<&str> = item.split_whitespace().collect();
    let tilt = tokens.iter().any(|t| matches!(*t, "xy" | "xz" | "yz"));
    let codes = tokens.iter().filter(|t| !matches!(**t, "xy" | "xz" | "yz"));

    let per_line = if tilt { 3 } else { 2 };
    let mut values = Vec::with_capacity(9);
    for axis in ["x", "y", "z"] {
        let line = lines
            .next()
            .ok_or_else(|| Error::cast(NAME, "box", format!("missing {} bounds", axis)))?;
        let row = line
            .split_whitespace()
            .map(|t| parse_num::<f64>(NAME, "box", Some(t), "bound"))
            .collect::<Result<Vec<_>>>()?;
        if row.len() != per_line {
            return Err(Error::cast(
                NAME,
                "box",
                format!("{} bounds need {} values, found {}", axis, per_line, row.len()),
            ));
        }
        values.extend(row);
        if !tilt {
            values.push(0.0);
        }
    }

    let mut simbox = SimBox::new();
    for (key, code) in ["bx", "by", "bz"].iter().zip(codes) {
        simbox.set(key, *code)?;
    }
    simbox
        .set_input(&values, Some(BoxType::LmpDump))
        .map_err(|e| Error::cast(NAME, "box", e.to_string()))?;
    simbox.set("allow_tilt", tilt)?;
    Ok(simbox.input().to_record())
}

fn atoms(text: &str) -> Result<Record> {
    let mut lines = text.lines();
    let names: Vec<String> = lines
        .next()
        .and_then(|l| l.strip_prefix("ITEM: ATOMS"))
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    if names.is_empty() {
        return Err(Error::cast(NAME, "atoms", "no column names after ITEM: ATOMS"));
    }

    let rows = lines.filter(|l| !l.trim().is_empty());
    let columns = parse_columns(&names, rows).map_err(|e| Error::cast(NAME, "atoms", e))?;
    let mut table = Table::new(columns, Record::new());
    table.sort_by("id");
    Ok(table.to_record())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SimFile;
    use crate::value::{Column, Value};

    const FRAME_0: &str = "ITEM: TIMESTEP\n100\nITEM: NUMBER OF ATOMS\n3\n\
        ITEM: BOX BOUNDS xy xz yz pp pp ff\n0.0 10.0 1.0\n0.0 10.0 0.0\n0.0 10.0 0.0\n\
        ITEM: ATOMS id type x y z\n3 1 3.0 3.5 3.0\n1 1 1.0 1.5 1.0\n2 2 2.0 2.5 2.0\n";

    const FRAME_1: &str = "ITEM: TIMESTEP\n200\nITEM: NUMBER OF ATOMS\n1\n\
        ITEM: BOX BOUNDS pp pp pp\n-1 1\n-2 2\n-3 3\n\
        ITEM: ATOMS id q\n1 -0.5\n";

    fn file() -> SimFile {
        SimFile::from_bytes(format!("{}{}", FRAME_0, FRAME_1).into_bytes(), NAME).unwrap()
    }

    #[test]
    fn header_reads_timestep_and_count() {
        let r = header("ITEM: TIMESTEP\n42\nITEM: NUMBER OF ATOMS\n7\n").unwrap();
        assert_eq!(r.get("timestep"), Some(&Value::Int(42)));
        assert_eq!(r.get("num_atoms"), Some(&Value::Int(7)));

        let err = header("ITEM: TIMESTEP\nnope\n").unwrap_err();
        assert!(matches!(err, Error::Cast { .. }));
    }

    #[test]
    fn bounds_handle_tilt_and_boundary_codes() {
        let r = bounds("ITEM: BOX BOUNDS pp ff pp\n0 2\n0 3\n0 4\n").unwrap();
        assert_eq!(r.get("lx").and_then(Value::as_f64), Some(2.0));
        assert_eq!(r.get("by").and_then(Value::as_str), Some("ff"));
        assert_eq!(r.get("allow_tilt").and_then(Value::as_bool), Some(false));

        let r = bounds("ITEM: BOX BOUNDS xy xz yz pp pp pp\n0 10 1\n0 10 0\n0 10 0\n").unwrap();
        assert_eq!(r.get("allow_tilt").and_then(Value::as_bool), Some(true));
        assert!(r.get("gamma").and_then(Value::as_f64).unwrap() < 90.0);

        assert!(bounds("ITEM: BOX BOUNDS pp pp pp\n0 1\n0 1\n").is_err());
        assert!(bounds("ITEM: BOX BOUNDS pp pp pp\n0 1 2\n0 1\n0 1\n").is_err());
    }

    #[test]
    fn atoms_are_sorted_by_id() {
        let r = atoms("ITEM: ATOMS id x\n2 0.2\n1 0.1\n\n").unwrap();
        assert_eq!(r.get("id").and_then(Value::as_array), Some(&Column::Int(vec![1, 2])));
        assert_eq!(r.get("x").and_then(Value::as_array), Some(&Column::Float(vec![0.1, 0.2])));
        assert!(atoms("ITEM: ATOMS\n1\n").is_err());
        assert!(atoms("ITEM: ATOMS id x\n1\n").is_err());
    }

    #[test]
    fn frames_merge_their_sections() {
        let file = file();
        assert_eq!(file.len(), 2);

        let frame = file.get(0).unwrap();
        let record = frame.record().unwrap();
        assert_eq!(record.get("timestep"), Some(&Value::Int(100)));
        assert!(record.get("box").and_then(Value::as_record).is_some());

        let table = frame.table().unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(table.column("id"), Some(&Column::Int(vec![1, 2, 3])));
        assert_eq!(table.meta().get("num_atoms"), Some(&Value::Int(3)));

        let last = file.get(-1).unwrap();
        let table = last.table().unwrap();
        assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["id", "q"]);
        let simbox = SimBox::from_nested(last.record().unwrap(), "box").unwrap().unwrap();
        assert_eq!(simbox.input().z0, -3.0);
        assert_eq!(simbox.input().lz, 6.0);
    }

    #[test]
    fn garbage_before_first_frame_is_rejected() {
        let err = SimFile::from_bytes(format!("junk\n{}", FRAME_0).into_bytes(), NAME).unwrap_err();
        assert!(matches!(err, Error::Malformed { offset: 0, .. }));
    }
}

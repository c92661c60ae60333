use super::{merge_frame, parse_num, split_comment, Format};
use crate::file::{Section, FRAME};
use crate::index::FrameIndex;
use crate::scan::{self, Grammar, Marker, Pattern, ScanOptions};
use crate::simbox::{BoxType, SimBox};
use crate::value::{parse_columns, Column, Record, Table, Value};
use crate::{Error, Result};

const NAME: &str = "lmpdata";

const GRAMMAR: Grammar = Grammar {
    frame: None,
    leading: Some("header"),
    markers: &[
        Marker {
            section: "box",
            pattern: Pattern::Contains(b"xlo xhi"),
        },
        Marker {
            section: "coeffs",
            pattern: Pattern::Contains(b"Coeffs"),
        },
        Marker {
            section: "masses",
            pattern: Pattern::Word(b"Masses"),
        },
        Marker {
            section: "atoms",
            pattern: Pattern::Word(b"Atoms"),
        },
        Marker {
            section: "velocities",
            pattern: Pattern::Word(b"Velocities"),
        },
        Marker {
            section: "bonds",
            pattern: Pattern::Word(b"Bonds"),
        },
        Marker {
            section: "angles",
            pattern: Pattern::Word(b"Angles"),
        },
        Marker {
            section: "dihedrals",
            pattern: Pattern::Word(b"Dihedrals"),
        },
        Marker {
            section: "impropers",
            pattern: Pattern::Word(b"Impropers"),
        },
    ],
    required: &["header", "box", "atoms"],
};

/// Atom styles and their columns, see the LAMMPS `read_data` command.
const ATOM_STYLES: &[(&str, &[&str])] = &[
    ("atomic", &["id", "type", "x", "y", "z"]),
    ("full", &["id", "mol", "type", "q", "x", "y", "z"]),
    ("charge", &["id", "type", "q", "x", "y", "z"]),
    ("dipole", &["id", "type", "q", "x", "y", "z", "mux", "muy", "muz"]),
    ("sphere", &["id", "type", "diameter", "density", "x", "y", "z"]),
    ("ellipsoid", &["id", "type", "ellipsoidflag", "density", "x", "y", "z"]),
    ("molecular", &["id", "mol", "type", "x", "y", "z"]),
    ("angle", &["id", "mol", "type", "x", "y", "z"]),
    ("bond", &["id", "mol", "type", "x", "y", "z"]),
    ("dihedral", &["id", "mol", "type", "x", "y", "z"]),
];

/// Trailing image flags some writers append to every atom row.
const IMAGE_FLAGS: [&str; 3] = ["nx", "ny", "nz"];

/// LAMMPS data file: a single configuration with its topology.
#[derive(Debug, Clone, Copy, Default)]
pub struct LmpData;

impl Format for LmpData {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["data", "lmp"]
    }

    fn scan(&self, data: &[u8], options: &ScanOptions) -> Result<FrameIndex> {
        scan::build(data, NAME, &GRAMMAR, options)
    }

    fn cast(&self, section: &Section<'_>) -> Result<Record> {
        let name = section.name();
        match name {
            FRAME => merge_frame(section, |s, record| match s.name() {
                "header" => None,
                "coeffs" => Some(
                    record
                        .get("title")
                        .and_then(Value::as_str)
                        .map(slug)
                        .unwrap_or_else(|| "coeffs".to_string()),
                ),
                other => Some(other.to_string()),
            }),
            "header" => header(section.text()?),
            "box" => bounds(section.text()?),
            "masses" => masses(section.text()?),
            "coeffs" => coeffs(section.text()?),
            "atoms" => atoms(section.text()?),
            "velocities" => {
                let names = ["id", "vx", "vy", "vz"].map(String::from);
                sorted_table(name, &names, body(section.text()?).map(|(l, _)| l))
            }
            "bonds" | "angles" | "dihedrals" | "impropers" => topology(name, section.text()?),
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

/// "Pair Coeffs" -> "pair_coeffs"
fn slug(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Non-empty lines after the section title, with their comments split off.
fn body(text: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    text.lines()
        .skip(1)
        .map(split_comment)
        .filter(|(line, _)| !line.is_empty())
}

fn header(text: &str) -> Result<Record> {
    let mut record = Record::new();
    let mut lines = text.lines();
    let title = lines.next().unwrap_or("").trim().trim_start_matches('#').trim();
    record.insert("title", title);

    for line in lines {
        let (line, _) = split_comment(line);
        if line.is_empty() {
            continue;
        }
        let (count, what) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let count: i64 = parse_num(NAME, "header", Some(count), "count")?;
        let what = what.split_whitespace().collect::<Vec<_>>().join("_");
        if what.is_empty() {
            return Err(Error::cast(NAME, "header", format!("count {} has no label", count)));
        }
        record.insert(format!("num_{}", what), count);
    }
    Ok(record)
}

/// `lo hi xlo xhi` lines for each axis and an optional `xy xz yz` tilt line.
fn bounds(text: &str) -> Result<Record> {
    let mut values: [Option<f64>; 9] = [None; 9];
    let mut tilt = false;
    for line in text.lines() {
        let (line, _) = split_comment(line);
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (slot, count) = match tokens.as_slice() {
            [.., "xlo", "xhi"] => (0, 2),
            [.., "ylo", "yhi"] => (2, 2),
            [.., "zlo", "zhi"] => (4, 2),
            [.., "xy", "xz", "yz"] => {
                tilt = true;
                (6, 3)
            }
            _ => continue,
        };
        if tokens.len() < count * 2 {
            return Err(Error::cast(NAME, "box", format!("too few values in '{}'", line)));
        }
        for (i, token) in tokens[..count].iter().enumerate() {
            values[slot + i] = Some(parse_num(NAME, "box", Some(*token), "bound")?);
        }
    }

    let values = values
        .iter()
        .enumerate()
        .map(|(i, v)| match (i, v) {
            (_, Some(v)) => Ok(*v),
            (6..=8, None) => Ok(0.0),
            (i, None) => Err(Error::cast(
                NAME,
                "box",
                format!("missing {} bounds", ["x", "y", "z"][i / 2]),
            )),
        })
        .collect::<Result<Vec<f64>>>()?;

    let mut simbox = SimBox::new();
    simbox
        .set_input(&values, Some(BoxType::LmpData))
        .map_err(|e| Error::cast(NAME, "box", e.to_string()))?;
    simbox.set("allow_tilt", tilt)?;
    Ok(simbox.input().to_record())
}

fn masses(text: &str) -> Result<Record> {
    let mut ids = Vec::new();
    let mut masses = Vec::new();
    let mut labels = Vec::new();
    for (line, comment) in body(text) {
        let mut tokens = line.split_whitespace();
        ids.push(parse_num::<i64>(NAME, "masses", tokens.next(), "type id")?);
        masses.push(parse_num::<f64>(NAME, "masses", tokens.next(), "mass")?);
        labels.push(comment.unwrap_or("").to_string());
    }

    let mut record = Record::new();
    record.insert("id", Column::Int(ids));
    record.insert("mass", Column::Float(masses));
    record.insert("label", Column::Str(labels));
    Ok(record)
}

/// `<Kind> Coeffs # style` followed by `id c1 c2 ...` rows.
fn coeffs(text: &str) -> Result<Record> {
    let (title, style) = split_comment(text.lines().next().unwrap_or(""));
    let rows: Vec<&str> = body(text).map(|(l, _)| l).collect();
    let width = rows.first().map(|r| r.split_whitespace().count()).unwrap_or(1);
    let names: Vec<String> = std::iter::once("id".to_string())
        .chain((1..width).map(|i| format!("coeff-{}", i)))
        .collect();
    let columns = parse_columns(&names, rows).map_err(|e| Error::cast(NAME, title, e))?;

    let mut record = Record::new();
    record.insert("title", title);
    if let Some(style) = style.filter(|s| !s.is_empty()) {
        record.insert("style", style);
    }
    for (name, column) in columns {
        record.insert(name, column);
    }
    Ok(record)
}

fn atoms(text: &str) -> Result<Record> {
    let (_, style) = split_comment(text.lines().next().unwrap_or(""));
    let rows: Vec<&str> = body(text).map(|(l, _)| l).collect();
    let width = rows.first().map(|r| r.split_whitespace().count()).unwrap_or(0);

    let style = match style.filter(|s| !s.is_empty()) {
        Some(style) => style,
        None => match width {
            0 | 5 | 8 => "atomic",
            7 | 10 => "full",
            n => {
                return Err(Error::cast(
                    NAME,
                    "atoms",
                    format!("no atom style comment and {} columns do not imply one", n),
                ))
            }
        },
    };
    let base = ATOM_STYLES
        .iter()
        .find(|(name, _)| *name == style)
        .map(|(_, columns)| *columns)
        .ok_or_else(|| Error::cast(NAME, "atoms", format!("unsupported atom style '{}'", style)))?;

    let mut names: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    if width == base.len() + IMAGE_FLAGS.len() {
        names.extend(IMAGE_FLAGS.iter().map(|s| s.to_string()));
    }

    let mut record = sorted_table("atoms", &names, rows)?;
    record.insert("style", style);
    Ok(record)
}

fn topology(section: &str, text: &str) -> Result<Record> {
    let atoms = match section {
        "bonds" => 2,
        "angles" => 3,
        _ => 4,
    };
    let names: Vec<String> = ["id", "type"]
        .iter()
        .map(|s| s.to_string())
        .chain((1..=atoms).map(|i| format!("atom-{}", i)))
        .collect();
    sorted_table(section, &names, body(text).map(|(l, _)| l))
}

fn sorted_table<'a, I>(section: &str, names: &[String], rows: I) -> Result<Record>
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = parse_columns(names, rows).map_err(|e| Error::cast(NAME, section, e))?;
    let mut table = Table::new(columns, Record::new());
    table.sort_by("id");
    Ok(table.to_record())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::SimFile;

    const DATA: &str = "LAMMPS data file via write_data\n\
        \n\
        4 atoms\n\
        2 atom types\n\
        1 bonds\n\
        1 bond types\n\
        \n\
        0.0 20.0 xlo xhi\n\
        -5.0 5.0 ylo yhi\n\
        0.0 30.0 zlo zhi\n\
        \n\
        Masses\n\
        \n\
        1 15.9994 # O\n\
        2 1.008 # H\n\
        \n\
        Pair Coeffs # lj/cut\n\
        \n\
        1 0.1553 3.166\n\
        2 0.0 0.0\n\
        \n\
        Bond Coeffs # harmonic\n\
        \n\
        1 450 0.9572\n\
        \n\
        Atoms # full\n\
        \n\
        2 1 2 0.4238 1.0 0.0 0.0\n\
        1 1 1 -0.8476 0.0 0.0 0.0\n\
        4 2 2 0.4238 5.0 1.0 0.0\n\
        3 2 1 -0.8476 4.0 1.0 0.0\n\
        \n\
        Velocities\n\
        \n\
        1 0.1 0.0 0.0\n\
        2 0.2 0.0 0.0\n\
        3 0.3 0.0 0.0\n\
        4 0.4 0.0 0.0\n\
        \n\
        Bonds\n\
        \n\
        1 1 1 2\n";

    #[test]
    fn locates_every_section() {
        let file = SimFile::from_bytes(DATA.as_bytes().to_vec(), NAME).unwrap();
        assert_eq!(file.len(), 1);
        let names: Vec<&str> = file.get(0).unwrap().sections().unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec!["header", "box", "masses", "coeffs", "coeffs", "atoms", "velocities", "bonds"]
        );
        assert_eq!(file.section("coeffs").unwrap().len(), 2);
    }

    #[test]
    fn header_counts_become_num_fields() {
        let r = header("Title line\n\n 4 atoms\n 2 atom types # comment\n").unwrap();
        assert_eq!(r.get("title").and_then(Value::as_str), Some("Title line"));
        assert_eq!(r.get("num_atoms"), Some(&Value::Int(4)));
        assert_eq!(r.get("num_atom_types"), Some(&Value::Int(2)));
        assert!(header("t\nmany atoms\n").is_err());
    }

    #[test]
    fn box_bounds_with_and_without_tilt() {
        let r = bounds("0 20 xlo xhi\n-5 5 ylo yhi\n0 30 zlo zhi\n").unwrap();
        assert_eq!(r.get("y0").and_then(Value::as_f64), Some(-5.0));
        assert_eq!(r.get("lz").and_then(Value::as_f64), Some(30.0));
        assert_eq!(r.get("allow_tilt").and_then(Value::as_bool), Some(false));

        let r = bounds("0 10 xlo xhi\n0 10 ylo yhi\n0 10 zlo zhi\n2 0 0 xy xz yz\n").unwrap();
        assert_eq!(r.get("allow_tilt").and_then(Value::as_bool), Some(true));
        assert!(r.get("gamma").and_then(Value::as_f64).unwrap() < 90.0);

        let r = bounds("0 10 xlo xhi\n0 10 ylo yhi\n0 10 zlo zhi\n# 0 0 0 xy xz yz\n").unwrap();
        assert_eq!(r.get("allow_tilt").and_then(Value::as_bool), Some(false));

        assert!(bounds("0 10 xlo xhi\n0 10 ylo yhi\n").is_err());
    }

    #[test]
    fn atom_style_comes_from_comment_or_width() {
        let r = atoms("Atoms # charge\n\n2 1 0.5 1 1 1\n1 1 -0.5 0 0 0\n").unwrap();
        assert_eq!(r.get("style").and_then(Value::as_str), Some("charge"));
        assert_eq!(r.get("q").and_then(Value::as_array), Some(&Column::Float(vec![-0.5, 0.5])));

        let r = atoms("Atoms\n\n1 1 0.0 0.0 0.0 0 0 1\n").unwrap();
        assert_eq!(r.get("style").and_then(Value::as_str), Some("atomic"));
        assert_eq!(r.get("nz").and_then(Value::as_array), Some(&Column::Int(vec![1])));

        assert!(atoms("Atoms\n\n1 1 0.0 0.0\n").is_err());
        assert!(atoms("Atoms # hybrid\n\n1 1 0.0 0.0 0.0\n").is_err());
    }

    #[test]
    fn frame_record_nests_sections() {
        let file = SimFile::from_bytes(DATA.as_bytes().to_vec(), NAME).unwrap();
        let frame = file.get(0).unwrap();
        let record = frame.record().unwrap();

        assert_eq!(record.get("num_bonds"), Some(&Value::Int(1)));
        let pair = record.get("pair_coeffs").and_then(Value::as_record).unwrap();
        assert_eq!(pair.get("style").and_then(Value::as_str), Some("lj/cut"));
        let bond = record.get("bond_coeffs").and_then(Value::as_record).unwrap();
        assert_eq!(bond.get("coeff-2").and_then(Value::as_array), Some(&Column::Float(vec![0.9572])));

        let masses = record.get("masses").and_then(Value::as_record).unwrap();
        assert_eq!(
            masses.get("label").and_then(Value::as_array),
            Some(&Column::Str(vec!["O".to_string(), "H".to_string()]))
        );

        let bonds = record.get("bonds").and_then(Value::as_record).unwrap();
        assert_eq!(bonds.get("atom-2").and_then(Value::as_array), Some(&Column::Int(vec![2])));

        let table = frame.table().unwrap();
        assert_eq!(table.column("id"), Some(&Column::Int(vec![1, 2, 3, 4])));
        assert_eq!(table.column("mol"), Some(&Column::Int(vec![1, 1, 2, 2])));
        assert_eq!(table.meta().get("title").and_then(Value::as_str), Some("LAMMPS data file via write_data"));

        let velocities = file.section("velocities").unwrap().first();
        assert_eq!(velocities.table().unwrap().num_rows(), 4);
    }
}

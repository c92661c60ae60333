//! CHARMM/NAMD/LAMMPS DCD trajectories.
//!
//! The file is a sequence of Fortran records: a header (`CORD` plus 20 control integers),
//! titles, the atom count, then per frame an optional 6-double unit cell record and three
//! coordinate records of `natoms` floats each.

use super::fortran::{read_block, Endian};
use super::{merge_frame, Format};
use crate::file::{Section, FRAME};
use crate::index::{ByteRange, FrameIndex, IndexBuilder};
use crate::scan::ScanOptions;
use crate::simbox::{BoxType, SimBox};
use crate::value::{Column, Record};
use crate::{Error, Result};

const NAME: &str = "dcd";
const HEADER_LEN: i32 = 84;
const TITLE_LEN: usize = 80;
const CELL_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq)]
struct Header {
    endian: Endian,
    nframes: i32,
    istart: i32,
    nsavc: i32,
    delta: f64,
    has_cell: bool,
    charmm: i32,
    titles: Vec<String>,
    natoms: usize,
    /// Bytes taken by the three header records.
    len: usize,
}

impl Header {
    fn parse(data: &[u8]) -> Result<Header> {
        let endian = Endian::detect(data, HEADER_LEN)
            .ok_or_else(|| Error::malformed(NAME, 0, "missing DCD header record"))?;

        let block = read_block(data, 0, endian, NAME)?;
        let p = block.payload;
        if p.len() != HEADER_LEN as usize || &p[..4] != b"CORD" {
            return Err(Error::malformed(NAME, 4, "missing CORD signature"));
        }
        let icntrl = |i: usize| endian.i32(&p[4 + 4 * i..]);

        let charmm = icntrl(19);
        if icntrl(8) != 0 {
            return Err(Error::malformed(NAME, 40, "fixed atoms are not supported"));
        }
        if charmm != 0 && icntrl(11) != 0 {
            return Err(Error::malformed(NAME, 52, "four dimensional trajectories are not supported"));
        }
        // X-PLOR files store a double timestep where CHARMM keeps a float and the cell flag.
        let (delta, has_cell) = if charmm != 0 {
            (endian.f32(&p[40..]) as f64, icntrl(10) != 0)
        } else {
            (endian.f64(&p[40..]), false)
        };

        let block = read_block(data, block.end, endian, NAME)?;
        let p = block.payload;
        let ntitle = match p.get(..4) {
            Some(head) => endian.i32(head).max(0) as usize,
            None => return Err(Error::malformed(NAME, block.start as u64, "empty title record")),
        };
        let titles = p[4..]
            .chunks(TITLE_LEN)
            .take(ntitle)
            .map(|t| {
                let end = t.iter().position(|&b| b == 0).unwrap_or(t.len());
                String::from_utf8_lossy(&t[..end]).trim_end().to_string()
            })
            .collect();

        let block = read_block(data, block.end, endian, NAME)?;
        let natoms = match block.payload {
            p if p.len() == 4 => endian.i32(p),
            _ => -1,
        };
        if natoms < 0 {
            return Err(Error::malformed(NAME, block.start as u64, "invalid atom count record"));
        }

        Ok(Header {
            endian,
            nframes: icntrl(0),
            istart: icntrl(1),
            nsavc: icntrl(2),
            delta,
            has_cell,
            charmm,
            titles,
            natoms: natoms as usize,
            len: block.end,
        })
    }

    fn of(section: &Section<'_>) -> Result<Header> {
        Header::parse(section.file().preamble("header")?.raw()?)
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("nframes", self.nframes as i64);
        record.insert("istart", self.istart as i64);
        record.insert("nsavc", self.nsavc as i64);
        record.insert("delta", self.delta);
        record.insert("has_cell", self.has_cell);
        record.insert("charmm", self.charmm as i64);
        record.insert("natoms", self.natoms as i64);
        record.insert("endian", self.endian.name());
        record.insert("titles", Column::Str(self.titles.clone()));
        record
    }
}

/// DCD binary trajectory.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dcd;

impl Format for Dcd {
    fn name(&self) -> &'static str {
        NAME
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["dcd"]
    }

    fn scan(&self, data: &[u8], _options: &ScanOptions) -> Result<FrameIndex> {
        let header = Header::parse(data)?;
        let mut builder = IndexBuilder::new(NAME, data.len() as u64);
        builder.preamble_section("header", ByteRange::new(0, header.len as u64))?;

        let coords = 4 * header.natoms;
        let mut pos = header.len;
        let mut count = 0;
        while pos < data.len() {
            builder.start_frame(pos as u64)?;
            if header.has_cell {
                let cell = read_block(data, pos, header.endian, NAME)?;
                if cell.payload.len() != CELL_LEN {
                    return Err(Error::malformed(NAME, pos as u64, "unit cell record is not 6 doubles"));
                }
                builder.start_section("box", pos as u64)?;
                pos = cell.end;
            }
            builder.start_section("atoms", pos as u64)?;
            for _ in 0..3 {
                let block = read_block(data, pos, header.endian, NAME)?;
                if block.payload.len() != coords {
                    return Err(Error::malformed(
                        NAME,
                        pos as u64,
                        format!("coordinate record holds {} bytes, expected {}", block.payload.len(), coords),
                    ));
                }
                pos = block.end;
            }
            builder.end_frame(pos as u64)?;
            count += 1;
        }

        if header.nframes as i64 != count {
            tracing::warn!(
                header = header.nframes,
                found = count,
                "DCD header frame count disagrees with file size"
            );
        }
        Ok(builder.finish())
    }

    fn cast(&self, section: &Section<'_>) -> Result<Record> {
        match section.name() {
            "header" => Ok(Header::parse(section.raw()?)?.to_record()),
            FRAME => {
                let header = Header::of(section)?;
                let i = section.frame_index().unwrap_or(0) as i64;
                let mut record = Record::new();
                record.insert("timestep", header.istart as i64 + i * header.nsavc as i64);
                record.extend(merge_frame(section, |s, _| Some(s.name().to_string()))?);
                Ok(record)
            }
            "box" => {
                let header = Header::of(section)?;
                cell(section.raw()?, header.endian)
            }
            "atoms" => {
                let header = Header::of(section)?;
                coordinates(section.raw()?, header.endian)
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

/// Stored as `a, gamma, b, beta, alpha, c`, with angles either as cosines or in degrees.
fn cell(raw: &[u8], endian: Endian) -> Result<Record> {
    let block = read_block(raw, 0, endian, NAME)?;
    let v: Vec<f64> = block.payload.chunks_exact(8).map(|c| endian.f64(c)).collect();
    if v.len() != 6 {
        return Err(Error::cast(NAME, "box", format!("expected 6 cell values, found {}", v.len())));
    }
    let cosines = [v[1], v[3], v[4]].iter().all(|x| (-1.0..=1.0).contains(x));

    let mut simbox = SimBox::new();
    let result = if cosines {
        simbox.set_input(&v, Some(BoxType::Dcd))
    } else {
        simbox.set_input(&[v[0], v[2], v[5], v[4], v[3], v[1]], Some(BoxType::Lattice))
    };
    result.map_err(|e| Error::cast(NAME, "box", e.to_string()))?;
    Ok(simbox.input().to_record())
}

fn coordinates(raw: &[u8], endian: Endian) -> Result<Record> {
    let mut record = Record::new();
    let mut pos = 0;
    for axis in ["x", "y", "z"] {
        let block = read_block(raw, pos, endian, NAME)?;
        let values = endian.f32s(block.payload).into_iter().map(f64::from).collect();
        record.insert(axis, Column::Float(values));
        pos = block.end;
    }
    Ok(record)
}

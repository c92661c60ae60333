//! LAMMPS dump output.

use std::fmt::Write as _;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::counting::CountingWriter;
use crate::file::Section;
use crate::simbox::{BoxType, SimBox};
use crate::value::{Table, Value};
use crate::{Error, Result};

/// Writes frames in the LAMMPS dump layout read by the `lmpdump` format.
///
/// Output is flushed on [`DumpWriter::finish`] or when the writer is dropped.
#[derive(Debug)]
pub struct DumpWriter<W: Write> {
    out: CountingWriter<W>,
    frames: usize,
}

impl<W: Write> Drop for DumpWriter<W> {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

impl DumpWriter<BufWriter<File>> {
    /// Creates a new dump file, and errors if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_ref())
            .map_err(Error::WriteFailed)?;
        Ok(DumpWriter::new(BufWriter::new(file)))
    }
}

impl<W: Write> DumpWriter<W> {
    pub fn new(inner: W) -> DumpWriter<W> {
        DumpWriter {
            out: CountingWriter::new(inner),
            frames: 0,
        }
    }

    #[inline(always)]
    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline(always)]
    pub fn bytes_written(&self) -> u64 {
        self.out.bytes_written()
    }

    /// Appends one frame. Atoms get ids `1..=n` when the table has no `id` column.
    pub fn write_frame(&mut self, timestep: i64, simbox: &SimBox, atoms: &Table) -> Result<()> {
        let rows = atoms.num_rows();
        let with_id = atoms.column("id").is_none();

        let mut buf = String::new();
        let _ = write!(buf, "ITEM: TIMESTEP\n{}\nITEM: NUMBER OF ATOMS\n{}\n", timestep, rows);

        let o = simbox.output();
        let tilt = o.allow_tilt;
        let _ = writeln!(
            buf,
            "ITEM: BOX BOUNDS{} {} {} {}",
            if tilt { " xy xz yz" } else { "" },
            o.bx,
            o.by,
            o.bz
        );
        let per_axis = if tilt { 3 } else { 2 };
        for axis in simbox.to_repr(BoxType::LmpDump).chunks(3) {
            let cells: Vec<String> = axis[..per_axis].iter().map(|v| v.to_string()).collect();
            let _ = writeln!(buf, "{}", cells.join(" "));
        }

        buf.push_str("ITEM: ATOMS");
        if with_id {
            buf.push_str(" id");
        }
        for name in atoms.column_names() {
            let _ = write!(buf, " {}", name);
        }
        buf.push('\n');
        self.write(&buf)?;

        for row in 0..rows {
            buf.clear();
            if with_id {
                let _ = write!(buf, "{}", row + 1);
            }
            for (i, (_, column)) in atoms.columns().enumerate() {
                if with_id || i > 0 {
                    buf.push(' ');
                }
                let _ = column.write_cell(row, &mut buf);
            }
            buf.push('\n');
            self.write(&buf)?;
        }

        self.frames += 1;
        tracing::debug!(timestep, atoms = rows, bytes = self.bytes_written(), "wrote dump frame");
        Ok(())
    }

    /// Re-emits a frame read from any format that provides a `box` and an atom table.
    pub fn copy_frame(&mut self, frame: &Section<'_>) -> Result<()> {
        let record = frame.record()?;
        let timestep = record.get("timestep").and_then(Value::as_i64).unwrap_or(0);
        let simbox = SimBox::from_nested(record, "box")?.unwrap_or_default();
        self.write_frame(timestep, &simbox, frame.table()?)
    }

    fn write(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).map_err(Error::WriteFailed)
    }

    /// Flushes and returns the number of bytes written.
    pub fn finish(mut self) -> Result<u64> {
        self.out.flush().map_err(Error::WriteFailed)?;
        Ok(self.out.bytes_written())
    }
}

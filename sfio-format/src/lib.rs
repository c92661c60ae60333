//! Lazy, index-first access to molecular simulation files.
//!
//! Opening a [`SimFile`] scans it once and records where every frame and section lies.
//! Nothing is parsed until a [`Section`] is asked for its text, record or table, and each
//! view is cached on the section once built.
//!
//! ```no_run
//! use sfio_format::SimFile;
//!
//! let file = SimFile::open("run/traj.lammpstrj")?;
//! let last = file.get(-1)?;
//! println!("{} frames, last has {} atoms", file.len(), last.table()?.num_rows());
//! # Ok::<(), sfio_format::Error>(())
//! ```
//!
//! The simulation cell is modelled separately by [`SimBox`], which converts between the
//! basis, lattice, LAMMPS and DCD representations.

#[cfg(feature = "writer")]
mod counting;
mod error;
mod file;
pub mod format;
mod index;
pub mod scan;
mod select;
mod simbox;
mod source;
mod value;
#[cfg(feature = "writer")]
mod writer;

pub use error::{Error, ErrorKind, Result};
pub use file::{Frame, OpenOptions, Section, SectionMatch, SimFile, FRAME};
pub use format::{Format, Registry};
pub use index::{ByteRange, FrameEntry, FrameIndex, IndexBuilder, SectionEntry};
pub use scan::{ScanMethod, ScanOptions};
pub use select::{Selector, Slice};
pub use simbox::{
    parse_values, BoundsCheck, BoxInput, BoxOutput, BoxType, BoxValue, Conversion, InputKey, Key,
    OutputKey, SimBox,
};
pub use source::ByteSource;
pub use value::{Column, Record, Table, Value};
#[cfg(feature = "writer")]
pub use writer::DumpWriter;

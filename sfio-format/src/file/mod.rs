mod reader;

use std::cell::OnceCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::format::Format;
use crate::index::{ByteRange, FrameEntry, FrameIndex, SectionEntry};
use crate::select::{resolve_index, Selector, Slice};
use crate::source::ByteSource;
use crate::value::{Record, Table};
use crate::{Error, Result};

pub use reader::OpenOptions;

/// Name under which whole frames are addressed and cast.
pub const FRAME: &str = "frame";

/// An opened simulation file: its bytes, the frame index built from them, and its format.
///
/// Frames and sections borrow from the file and read its bytes on demand.
#[derive(Debug)]
pub struct SimFile {
    pub(crate) path: Option<PathBuf>,
    pub(crate) source: ByteSource,
    pub(crate) index: FrameIndex,
    pub(crate) format: Arc<dyn Format>,
}

impl SimFile {
    /// Opens `path` with the format detected from its name.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<SimFile> {
        OpenOptions::new().open(path)
    }

    pub fn options() -> OpenOptions {
        OpenOptions::new()
    }

    /// Indexes an in-memory buffer as format `format`.
    pub fn from_bytes(bytes: Vec<u8>, format: &str) -> Result<SimFile> {
        OpenOptions::new().format(format).open_bytes(bytes)
    }

    #[inline(always)]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[inline(always)]
    pub fn format(&self) -> &dyn Format {
        self.format.as_ref()
    }

    #[inline(always)]
    pub fn index(&self) -> &FrameIndex {
        &self.index
    }

    #[inline(always)]
    pub fn source(&self) -> &ByteSource {
        &self.source
    }

    /// Number of frames.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn frame_at(&self, i: usize) -> Frame<'_> {
        let entry = &self.index.frames[i];
        Section::new(self, FRAME, entry.range, Some(i))
    }

    /// Frame `index`, counting negative indices from the end.
    pub fn get(&self, index: isize) -> Result<Frame<'_>> {
        let i = resolve_index(index, self.len())?;
        Ok(self.frame_at(i))
    }

    /// Frames selected by `start:stop:step` with list semantics.
    pub fn slice<S: Into<Slice>>(&self, slice: S) -> Result<Vec<Frame<'_>>> {
        let indices = slice.into().indices(self.len())?;
        Ok(indices.into_iter().map(|i| self.frame_at(i)).collect())
    }

    /// Frames at each of `indices`, in order. Every index is validated.
    pub fn take(&self, indices: &[isize]) -> Result<Vec<Frame<'_>>> {
        self.select(&Selector::Indices(indices.to_vec()))
    }

    pub fn select(&self, selector: &Selector) -> Result<Vec<Frame<'_>>> {
        let indices = selector.resolve(self.len())?;
        Ok(indices.into_iter().map(|i| self.frame_at(i)).collect())
    }

    pub fn frames(&self) -> impl Iterator<Item = Frame<'_>> + '_ {
        (0..self.len()).map(move |i| self.frame_at(i))
    }

    /// Every section called `name` across the file-level sections and all frames.
    pub fn section(&self, name: &str) -> Result<SectionMatch<'_>> {
        if name == FRAME {
            return SectionMatch::from_vec(self.frames().collect(), name, || self.index.section_names());
        }

        let preamble = self
            .index
            .preamble
            .iter()
            .filter(|e| e.name == name)
            .map(|e| Section::new(self, &e.name, e.range, None));
        let framed = self.index.frames.iter().enumerate().flat_map(|(i, f)| {
            f.sections
                .iter()
                .filter(move |e| e.name == name)
                .map(move |e| Section::new(self, &e.name, e.range, Some(i)))
        });
        SectionMatch::from_vec(preamble.chain(framed).collect(), name, || {
            self.index.section_names()
        })
    }

    /// The first file-level section called `name`.
    pub fn preamble(&self, name: &str) -> Result<Section<'_>> {
        self.index
            .preamble
            .iter()
            .find(|e| e.name == name)
            .map(|e| Section::new(self, &e.name, e.range, None))
            .ok_or_else(|| Error::SectionNotFound {
                name: name.to_string(),
                available: self.index.preamble.iter().map(|e| e.name.clone()).collect(),
            })
    }
}

/// A byte range of a [`SimFile`] with lazily cast views.
///
/// Each view is computed at most once per handle. Creating a new handle for the same range
/// starts with empty caches.
#[derive(Clone)]
pub struct Section<'a> {
    file: &'a SimFile,
    name: &'a str,
    range: ByteRange,
    frame: Option<usize>,
    text: OnceCell<&'a str>,
    record: OnceCell<Record>,
    table: OnceCell<Table>,
}

/// A whole frame, addressed as the section named [`FRAME`].
pub type Frame<'a> = Section<'a>;

impl<'a> Section<'a> {
    fn new(file: &'a SimFile, name: &'a str, range: ByteRange, frame: Option<usize>) -> Section<'a> {
        Section {
            file,
            name,
            range,
            frame,
            text: OnceCell::new(),
            record: OnceCell::new(),
            table: OnceCell::new(),
        }
    }

    #[inline(always)]
    pub fn name(&self) -> &'a str {
        self.name
    }

    #[inline(always)]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    #[inline(always)]
    pub fn file(&self) -> &'a SimFile {
        self.file
    }

    /// Position of the owning frame; `None` for file-level sections.
    #[inline(always)]
    pub fn frame_index(&self) -> Option<usize> {
        self.frame
    }

    #[inline(always)]
    pub fn is_frame(&self) -> bool {
        self.name == FRAME
    }

    fn entry(&self) -> Option<&'a FrameEntry> {
        self.frame.and_then(|i| self.file.index.frame(i))
    }

    /// Exact bytes of the range.
    #[inline(always)]
    pub fn raw(&self) -> Result<&'a [u8]> {
        self.file.source.read(self.range)
    }

    /// The range decoded as UTF-8.
    pub fn text(&self) -> Result<&'a str> {
        if let Some(text) = self.text.get() {
            return Ok(*text);
        }
        let raw = self.raw()?;
        let text = std::str::from_utf8(raw).map_err(|e| Error::InvalidEncoding(e, self.range))?;
        Ok(*self.text.get_or_init(|| text))
    }

    /// Structured view produced by the file's format.
    pub fn record(&self) -> Result<&Record> {
        if let Some(record) = self.record.get() {
            return Ok(record);
        }
        let record = self.file.format.cast(self)?;
        Ok(self.record.get_or_init(|| record))
    }

    /// Tabular view; metadata holds the non-column fields of [`Section::record`].
    pub fn table(&self) -> Result<&Table> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let key = self.file.format.table_key(self.name);
        let table = Table::from_record(self.record()?, key);
        Ok(self.table.get_or_init(|| table))
    }

    /// Sections of this frame, in file order. Only frames have sub-sections.
    pub fn sections(&self) -> Result<Vec<Section<'a>>> {
        if !self.is_frame() {
            return Ok(Vec::new());
        }
        let file = self.file;
        let frame = self.frame;
        Ok(self
            .entry()
            .map(|entry| {
                entry
                    .sections
                    .iter()
                    .map(|e| Section::new(file, &e.name, e.range, frame))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Sections called `name` within this frame.
    pub fn section(&self, name: &str) -> Result<SectionMatch<'a>> {
        let found: Vec<Section<'a>> = self
            .sections()?
            .into_iter()
            .filter(|s| s.name == name)
            .collect();
        SectionMatch::from_vec(found, name, || {
            self.entry()
                .map(|e| section_names(&e.sections))
                .unwrap_or_default()
        })
    }

    /// The first section called `name` in the same frame.
    pub fn sibling(&self, name: &str) -> Result<Section<'a>> {
        let file = self.file;
        let frame = self.frame;
        let entry = self.entry();
        entry
            .and_then(|e| e.sections.iter().find(|s| s.name == name))
            .map(|e| Section::new(file, &e.name, e.range, frame))
            .ok_or_else(|| Error::SectionNotFound {
                name: name.to_string(),
                available: entry.map(|e| section_names(&e.sections)).unwrap_or_default(),
            })
    }
}

fn section_names(entries: &[SectionEntry]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for e in entries {
        if !names.contains(&e.name) {
            names.push(e.name.clone());
        }
    }
    names
}

impl PartialEq for Section<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.file, other.file)
            && self.name == other.name
            && self.range == other.range
            && self.frame == other.frame
    }
}

impl fmt::Debug for Section<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Section")
            .field("name", &self.name)
            .field("range", &self.range)
            .field("frame", &self.frame)
            .field("cast", &self.record.get().is_some())
            .finish()
    }
}

/// Result of a lookup by section name.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionMatch<'a> {
    One(Section<'a>),
    Many(Vec<Section<'a>>),
}

impl<'a> SectionMatch<'a> {
    fn from_vec<F>(mut found: Vec<Section<'a>>, name: &str, available: F) -> Result<SectionMatch<'a>>
    where
        F: FnOnce() -> Vec<String>,
    {
        match found.len() {
            0 => Err(Error::SectionNotFound {
                name: name.to_string(),
                available: available(),
            }),
            1 => Ok(SectionMatch::One(found.remove(0))),
            _ => Ok(SectionMatch::Many(found)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SectionMatch::One(_) => 1,
            SectionMatch::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn one(self) -> Option<Section<'a>> {
        match self {
            SectionMatch::One(s) => Some(s),
            SectionMatch::Many(_) => None,
        }
    }

    pub fn first(self) -> Section<'a> {
        match self {
            SectionMatch::One(s) => s,
            SectionMatch::Many(mut v) => v.remove(0),
        }
    }

    pub fn into_vec(self) -> Vec<Section<'a>> {
        match self {
            SectionMatch::One(s) => vec![s],
            SectionMatch::Many(v) => v,
        }
    }
}

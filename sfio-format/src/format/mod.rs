//! Format plug-ins: how a file type is scanned into frames and how its sections are cast.

mod dcd;
mod fortran;
mod lmpdata;
mod lmpdump;
mod poscar;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::file::Section;
use crate::index::FrameIndex;
use crate::scan::ScanOptions;
use crate::value::Record;
use crate::{Error, Result};

pub use dcd::Dcd;
pub use lmpdata::LmpData;
pub use lmpdump::LmpDump;
pub use poscar::Poscar;

/// A file type the indexer understands.
///
/// `scan` locates frames and sections without interpreting them; `cast` turns one located
/// section into a [`Record`]. Frames are cast as sections named `"frame"`.
pub trait Format: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case extensions without the dot.
    fn extensions(&self) -> &'static [&'static str];

    /// Exact file names recognised regardless of extension.
    fn file_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn scan(&self, data: &[u8], options: &ScanOptions) -> Result<FrameIndex>;

    fn cast(&self, section: &Section<'_>) -> Result<Record>;

    /// Field of a section's record holding the table columns. `None` takes the record's own arrays.
    fn table_key(&self, _section: &str) -> Option<&'static str> {
        None
    }
}

/// Known formats, looked up by name or detected from file names.
#[derive(Debug, Clone)]
pub struct Registry {
    formats: Vec<Arc<dyn Format>>,
}

impl Default for Registry {
    fn default() -> Self {
        Registry::builtin()
    }
}

impl Registry {
    pub fn empty() -> Registry {
        Registry { formats: Vec::new() }
    }

    pub fn builtin() -> Registry {
        let mut registry = Registry::empty();
        registry.register(LmpDump);
        registry.register(LmpData);
        registry.register(Dcd);
        registry.register(Poscar);
        registry
    }

    /// Adds a format. Later registrations shadow earlier ones with the same name or extension.
    pub fn register<F: Format + 'static>(&mut self, format: F) {
        self.formats.insert(0, Arc::new(format));
    }

    pub fn formats(&self) -> impl Iterator<Item = &Arc<dyn Format>> {
        self.formats.iter()
    }

    /// Looks up a format by name or extension, ignoring case and a leading dot.
    pub fn by_name(&self, name: &str) -> Result<Arc<dyn Format>> {
        let key = name.trim_start_matches('.').to_ascii_lowercase();
        self.formats
            .iter()
            .find(|f| f.name() == key)
            .or_else(|| {
                self.formats
                    .iter()
                    .find(|f| f.extensions().iter().any(|e| *e == key))
            })
            .cloned()
            .ok_or_else(|| Error::UnknownFormat(name.to_string()))
    }

    /// Picks a format from the file name, ignoring a trailing `.gz`.
    pub fn detect(&self, path: &Path) -> Result<Arc<dyn Format>> {
        let undetectable = || Error::UndetectableFormat(path.to_path_buf());
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(undetectable)?;
        let file_name = file_name.strip_suffix(".gz").unwrap_or(file_name);

        if let Some(f) = self
            .formats
            .iter()
            .find(|f| f.file_names().iter().any(|n| *n == file_name))
        {
            return Ok(f.clone());
        }

        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(undetectable)?;
        self.formats
            .iter()
            .find(|f| f.extensions().iter().any(|e| *e == ext))
            .cloned()
            .ok_or_else(undetectable)
    }
}

/// Casts every section of `frame` and combines them.
///
/// `key` names the field a section's record is nested under; `None` merges its fields into the
/// top level.
pub(crate) fn merge_frame<F>(frame: &Section<'_>, key: F) -> Result<Record>
where
    F: Fn(&Section<'_>, &Record) -> Option<String>,
{
    let mut out = Record::new();
    for child in frame.sections()? {
        let record = child.record()?;
        match key(&child, record) {
            Some(k) => out.insert(k, record.clone()),
            None => out.extend(record.clone()),
        }
    }
    Ok(out)
}

/// Line with any `#` comment removed, and the comment text.
pub(crate) fn split_comment(line: &str) -> (&str, Option<&str>) {
    match line.split_once('#') {
        Some((content, comment)) => (content.trim(), Some(comment.trim())),
        None => (line.trim(), None),
    }
}

pub(crate) fn parse_num<T: std::str::FromStr>(
    format: &'static str,
    section: &str,
    token: Option<&str>,
    what: &str,
) -> Result<T> {
    let token = token.ok_or_else(|| Error::cast(format, section, format!("missing {}", what)))?;
    token
        .parse::<T>()
        .map_err(|_| Error::cast(format, section, format!("invalid {} '{}'", what, token)))
}

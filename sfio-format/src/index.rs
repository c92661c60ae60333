use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A contiguous run of bytes in a source, recorded during the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    #[inline(always)]
    pub fn new(start: u64, length: u64) -> ByteRange {
        ByteRange { start, length }
    }

    /// Range covering `[start, end)`. An `end` before `start` gives an empty range.
    #[inline(always)]
    pub fn between(start: u64, end: u64) -> ByteRange {
        ByteRange {
            start,
            length: end.saturating_sub(start),
        }
    }

    /// End of the range, saturating at `u64::MAX`.
    #[inline(always)]
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    /// End of the range, or `None` when `start + length` overflows.
    #[inline(always)]
    pub fn checked_end(&self) -> Option<u64> {
        self.start.checked_add(self.length)
    }

    /// True when the range ends at or before `len`.
    #[inline(always)]
    pub fn fits(&self, len: u64) -> bool {
        self.checked_end().map_or(false, |end| end <= len)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    #[inline(always)]
    pub fn contains(&self, other: &ByteRange) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x})", self.start, self.end())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub name: String,
    pub range: ByteRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub range: ByteRange,

    /// Sections in encounter order. A name may appear more than once.
    pub sections: Vec<SectionEntry>,
}

impl FrameEntry {
    pub fn sections_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a SectionEntry> {
        self.sections.iter().filter(move |s| s.name == name)
    }
}

/// Byte positions of every frame and section of one source.
///
/// Built once by a format's scanner and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameIndex {
    pub(crate) format: String,
    pub(crate) source_len: u64,

    /// File-level sections that sit outside every frame, e.g. a binary header.
    pub(crate) preamble: Vec<SectionEntry>,
    pub(crate) frames: Vec<FrameEntry>,
}

impl FrameIndex {
    #[inline(always)]
    pub fn format(&self) -> &str {
        &self.format
    }

    #[inline(always)]
    pub fn source_len(&self) -> u64 {
        self.source_len
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline(always)]
    pub fn frame(&self, index: usize) -> Option<&FrameEntry> {
        self.frames.get(index)
    }

    #[inline(always)]
    pub fn frames(&self) -> &[FrameEntry] {
        &self.frames
    }

    #[inline(always)]
    pub fn preamble(&self) -> &[SectionEntry] {
        &self.preamble
    }

    /// Distinct section names in encounter order, preamble first.
    pub fn section_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let all = self
            .preamble
            .iter()
            .chain(self.frames.iter().flat_map(|f| f.sections.iter()));
        for entry in all {
            if !names.iter().any(|n| n == &entry.name) {
                names.push(entry.name.clone());
            }
        }
        names
    }

    /// True when every range fits the source, frames follow each other in order and
    /// every section lies in its frame after the one before it.
    pub fn is_consistent(&self) -> bool {
        let len = self.source_len;
        if !self.preamble.iter().all(|s| s.range.fits(len)) {
            return false;
        }

        let mut last = 0;
        for frame in &self.frames {
            if !frame.range.fits(len) || frame.range.start < last {
                return false;
            }
            let mut cursor = frame.range.start;
            for section in &frame.sections {
                if !frame.range.contains(&section.range) || section.range.start < cursor {
                    return false;
                }
                cursor = section.range.end();
            }
            last = frame.range.end();
        }
        true
    }

    /// Fails with a format error naming the first frame that misses one of `required`.
    pub(crate) fn check_required(&self, format: &'static str, required: &[&str]) -> Result<()> {
        for (i, frame) in self.frames.iter().enumerate() {
            for name in required {
                if frame.sections_named(name).next().is_none() {
                    return Err(Error::Malformed {
                        format,
                        offset: frame.range.start,
                        reason: format!("frame {} has no '{}' section", i, name),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Append-only recorder used by scanners while walking a source.
#[derive(Debug)]
pub struct IndexBuilder {
    format: &'static str,
    source_len: u64,
    preamble: Vec<SectionEntry>,
    frames: Vec<FrameEntry>,
    frame_start: Option<u64>,
    open: Option<(&'static str, u64)>,
    sections: Vec<SectionEntry>,
    last: u64,
}

impl IndexBuilder {
    pub fn new(format: &'static str, source_len: u64) -> IndexBuilder {
        IndexBuilder {
            format,
            source_len,
            preamble: Vec::new(),
            frames: Vec::new(),
            frame_start: None,
            open: None,
            sections: Vec::new(),
            last: 0,
        }
    }

    fn advance(&mut self, at: u64) -> Result<()> {
        if at < self.last || at > self.source_len {
            return Err(Error::malformed(
                self.format,
                at,
                format!("marker out of order (previous marker at byte {})", self.last),
            ));
        }
        self.last = at;
        Ok(())
    }

    /// Closes the open frame (if any) at `at` and opens a new one there.
    pub fn start_frame(&mut self, at: u64) -> Result<()> {
        self.advance(at)?;
        self.close_frame(at);
        self.frame_start = Some(at);
        Ok(())
    }

    /// Closes the open section (if any) at `at` and opens `name` there.
    pub fn start_section(&mut self, name: &'static str, at: u64) -> Result<()> {
        self.advance(at)?;
        if self.frame_start.is_none() {
            return Err(Error::malformed(
                self.format,
                at,
                format!("section '{}' outside of any frame", name),
            ));
        }
        self.close_section(at);
        self.open = Some((name, at));
        Ok(())
    }

    pub fn end_section(&mut self, at: u64) -> Result<()> {
        self.advance(at)?;
        self.close_section(at);
        Ok(())
    }

    pub fn end_frame(&mut self, at: u64) -> Result<()> {
        self.advance(at)?;
        self.close_frame(at);
        Ok(())
    }

    /// Records a file-level section that belongs to no frame.
    pub fn preamble_section(&mut self, name: &'static str, range: ByteRange) -> Result<()> {
        if !range.fits(self.source_len) {
            return Err(Error::malformed(self.format, range.start, "section past end of file"));
        }
        self.preamble.push(SectionEntry {
            name: name.to_string(),
            range,
        });
        Ok(())
    }

    fn close_section(&mut self, at: u64) {
        if let Some((name, start)) = self.open.take() {
            self.sections.push(SectionEntry {
                name: name.to_string(),
                range: ByteRange::between(start, at),
            });
        }
    }

    fn close_frame(&mut self, at: u64) {
        self.close_section(at);
        if let Some(start) = self.frame_start.take() {
            self.frames.push(FrameEntry {
                range: ByteRange::between(start, at),
                sections: std::mem::take(&mut self.sections),
            });
        }
    }

    pub fn finish(mut self) -> FrameIndex {
        let end = self.source_len;
        self.close_frame(end);
        tracing::debug!(
            format = self.format,
            bytes = self.source_len,
            frames = self.frames.len(),
            "built frame index"
        );
        FrameIndex {
            format: self.format.to_string(),
            source_len: self.source_len,
            preamble: self.preamble,
            frames: self.frames,
        }
    }
}

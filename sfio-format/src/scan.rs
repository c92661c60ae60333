//! Marker-driven scanning of line oriented text formats.
//!
//! A [`Grammar`] names the line patterns that open frames and sections. Both scan
//! methods classify the same lines with the same grammar, so they always agree on
//! the resulting [`FrameIndex`].

use std::collections::BTreeSet;

use crate::index::{FrameIndex, IndexBuilder};
use crate::{Error, Result};

pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMethod {
    /// Walk the source one line at a time.
    Line,
    /// Search fixed-size windows for marker bytes, then classify only the hit lines.
    Chunk,
}

impl Default for ScanMethod {
    fn default() -> Self {
        ScanMethod::Chunk
    }
}

impl std::str::FromStr for ScanMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "line" => Ok(ScanMethod::Line),
            "chunk" => Ok(ScanMethod::Chunk),
            other => Err(Error::UnknownFormat(format!("scan method '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub method: ScanMethod,
    pub chunk_size: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            method: ScanMethod::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Line starts with the bytes.
    Prefix(&'static [u8]),
    /// Bytes occur anywhere in the line.
    Contains(&'static [u8]),
    /// First whitespace-delimited token of the line equals the bytes.
    Word(&'static [u8]),
}

impl Pattern {
    #[inline(always)]
    pub fn needle(&self) -> &'static [u8] {
        match *self {
            Pattern::Prefix(n) | Pattern::Contains(n) | Pattern::Word(n) => n,
        }
    }

    pub fn matches(&self, line: &[u8]) -> bool {
        match *self {
            Pattern::Prefix(n) => line.starts_with(n),
            Pattern::Contains(n) => find(line, n, 0).is_some(),
            Pattern::Word(n) => first_token(line) == n,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Marker {
    pub section: &'static str,
    pub pattern: Pattern,
}

/// Line patterns of one text format.
///
/// Markers are tried in order; the first match wins.
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    /// Opens a new frame. `None` makes the whole source a single frame.
    pub frame: Option<Pattern>,
    /// Section opened together with every frame.
    pub leading: Option<&'static str>,
    pub markers: &'static [Marker],
    /// Sections every frame must contain.
    pub required: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Frame,
    Section(&'static str),
}

impl Grammar {
    fn classify(&self, line: &[u8]) -> Option<Event> {
        if let Some(frame) = self.frame {
            if frame.matches(line) {
                return Some(Event::Frame);
            }
        }
        self.markers
            .iter()
            .find(|m| m.pattern.matches(line))
            .map(|m| Event::Section(m.section))
    }

    fn needles(&self) -> Vec<&'static [u8]> {
        let mut needles: Vec<&'static [u8]> = Vec::new();
        let all = self
            .frame
            .iter()
            .chain(self.markers.iter().map(|m| &m.pattern))
            .map(|p| p.needle());
        for needle in all {
            if !needles.contains(&needle) {
                needles.push(needle);
            }
        }
        needles
    }
}

/// Scans `data` once and records every frame and section of `grammar`.
pub fn build(
    data: &[u8],
    format: &'static str,
    grammar: &Grammar,
    options: &ScanOptions,
) -> Result<FrameIndex> {
    let events = match options.method {
        ScanMethod::Line => scan_by_line(data, grammar),
        ScanMethod::Chunk => scan_by_chunk(data, grammar, options.chunk_size),
    };
    tracing::debug!(
        format,
        method = ?options.method,
        bytes = data.len(),
        markers = events.len(),
        "scanned source"
    );
    let index = assemble(data, format, grammar, &events)?;
    index.check_required(format, grammar.required)?;
    Ok(index)
}

fn scan_by_line(data: &[u8], grammar: &Grammar) -> Vec<(u64, Event)> {
    lines(data)
        .filter_map(|(at, line)| grammar.classify(line).map(|e| (at as u64, e)))
        .collect()
}

fn scan_by_chunk(data: &[u8], grammar: &Grammar, chunk_size: usize) -> Vec<(u64, Event)> {
    let needles = grammar.needles();
    let longest = needles.iter().map(|n| n.len()).max().unwrap_or(0);
    // A window must always be able to hold a whole needle.
    let chunk_size = chunk_size.max(longest + 1);
    let overlap = longest.saturating_sub(1);

    let mut starts = BTreeSet::new();
    let mut cursor = LineCursor::default();
    let mut hits = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let end = (pos + chunk_size + overlap).min(data.len());
        let window = &data[pos..end];
        hits.clear();
        for needle in &needles {
            let mut from = 0;
            while let Some(hit) = find(window, needle, from) {
                // Hits starting in the overlap belong to the next window.
                if hit < chunk_size {
                    hits.push(pos + hit);
                }
                from = hit + 1;
            }
        }
        hits.sort_unstable();
        for &hit in &hits {
            starts.insert(cursor.advance(data, hit));
        }
        tracing::trace!(start = format_args!("{:#x}", pos), end = format_args!("{:#x}", end), "chunk");
        pos += chunk_size;
    }

    starts
        .into_iter()
        .filter_map(|at| {
            let line = line_at(data, at);
            grammar.classify(line).map(|e| (at as u64, e))
        })
        .collect()
}

fn assemble(
    data: &[u8],
    format: &'static str,
    grammar: &Grammar,
    events: &[(u64, Event)],
) -> Result<FrameIndex> {
    let mut builder = IndexBuilder::new(format, data.len() as u64);

    if grammar.frame.is_some() {
        let first = events
            .iter()
            .find(|(_, e)| *e == Event::Frame)
            .map(|(at, _)| *at as usize)
            .unwrap_or(data.len());
        if let Some(offset) = data[..first].iter().position(|b| !b.is_ascii_whitespace()) {
            return Err(Error::malformed(
                format,
                offset as u64,
                "content before the first frame marker",
            ));
        }
    } else {
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(builder.finish());
        }
        builder.start_frame(0)?;
        if let Some(leading) = grammar.leading {
            builder.start_section(leading, 0)?;
        }
    }

    for &(at, event) in events {
        match event {
            Event::Frame => {
                builder.start_frame(at)?;
                if let Some(leading) = grammar.leading {
                    builder.start_section(leading, at)?;
                }
            }
            Event::Section(name) => builder.start_section(name, at)?,
        }
    }

    Ok(builder.finish())
}

/// Lines with their byte offsets. The terminating `\n` is not part of the line.
pub(crate) fn lines(data: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    let mut pos = 0;
    std::iter::from_fn(move || {
        if pos >= data.len() {
            return None;
        }
        let start = pos;
        let end = data[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| start + i)
            .unwrap_or(data.len());
        pos = end + 1;
        Some((start, &data[start..end]))
    })
}

/// Start of the line holding a position, for positions visited in ascending order.
/// Every byte is examined at most once.
#[derive(Debug, Default)]
struct LineCursor {
    seen: usize,
    start: usize,
}

impl LineCursor {
    fn advance(&mut self, data: &[u8], at: usize) -> usize {
        if at > self.seen {
            if let Some(i) = data[self.seen..at].iter().rposition(|&b| b == b'\n') {
                self.start = self.seen + i + 1;
            }
            self.seen = at;
        }
        self.start
    }
}

fn line_at(data: &[u8], at: usize) -> &[u8] {
    let end = data[at..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|i| at + i)
        .unwrap_or(data.len());
    &data[at..end]
}

fn first_token(line: &[u8]) -> &[u8] {
    let start = match line.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(i) => i,
        None => return &[],
    };
    let rest = &line[start..];
    let end = rest
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'#')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() || haystack.len() - from < needle.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| from + i)
}

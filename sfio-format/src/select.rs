//! Integer, slice and fancy selection of frames with list semantics.

use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::str::FromStr;

use crate::{Error, Result};

/// A `start:stop:step` slice. Missing bounds take the list defaults for the sign of `step`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Slice {
    pub start: Option<isize>,
    pub stop: Option<isize>,
    pub step: Option<isize>,
}

impl Slice {
    pub fn new(start: Option<isize>, stop: Option<isize>, step: Option<isize>) -> Slice {
        Slice { start, stop, step }
    }

    /// Positions selected from a sequence of `len` elements. Out-of-range bounds are clamped.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>> {
        let len = len as isize;
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(Error::ZeroStep);
        }

        let (lower, upper) = if step < 0 { (-1, len - 1) } else { (0, len) };
        let clamp = |bound: Option<isize>, default: isize| match bound {
            None => default,
            Some(b) if b < 0 => (b + len).max(lower),
            Some(b) => b.min(upper),
        };
        let start = clamp(self.start, if step < 0 { upper } else { lower });
        let stop = clamp(self.stop, if step < 0 { lower } else { upper });

        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i = match i.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(out)
    }
}

impl From<Range<isize>> for Slice {
    fn from(r: Range<isize>) -> Self {
        Slice::new(Some(r.start), Some(r.end), None)
    }
}

impl From<RangeFrom<isize>> for Slice {
    fn from(r: RangeFrom<isize>) -> Self {
        Slice::new(Some(r.start), None, None)
    }
}

impl From<RangeTo<isize>> for Slice {
    fn from(r: RangeTo<isize>) -> Self {
        Slice::new(None, Some(r.end), None)
    }
}

impl From<RangeFull> for Slice {
    fn from(_: RangeFull) -> Self {
        Slice::default()
    }
}

/// Position of `index` in a sequence of `len`, counting negative indices from the end.
pub fn resolve_index(index: isize, len: usize) -> Result<usize> {
    let signed_len = len as isize;
    let resolved = if index < 0 { index + signed_len } else { index };
    if resolved < 0 || resolved >= signed_len {
        return Err(Error::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Index(isize),
    Slice(Slice),
    Indices(Vec<isize>),
}

impl Selector {
    /// Positions selected from a sequence of `len`, in selection order.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            Selector::Index(i) => Ok(vec![resolve_index(*i, len)?]),
            Selector::Slice(s) => s.indices(len),
            Selector::Indices(list) => list.iter().map(|i| resolve_index(*i, len)).collect(),
        }
    }
}

impl FromStr for Selector {
    type Err = Error;

    /// Parses `3`, `-1`, `1:3`, `::-1` or `1,5,9`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidSelector(s.to_string());
        let int = |part: &str| part.trim().parse::<isize>().map_err(|_| invalid());
        let bound = |part: &str| -> Result<Option<isize>> {
            if part.trim().is_empty() {
                Ok(None)
            } else {
                int(part).map(Some)
            }
        };

        if s.contains(':') {
            let parts: Vec<&str> = s.split(':').collect();
            if parts.len() > 3 {
                return Err(invalid());
            }
            let start = bound(parts[0])?;
            let stop = bound(parts[1])?;
            let step = match parts.get(2) {
                Some(p) => bound(p)?,
                None => None,
            };
            Ok(Selector::Slice(Slice::new(start, stop, step)))
        } else if s.contains(',') {
            let list = s
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(int)
                .collect::<Result<Vec<_>>>()?;
            Ok(Selector::Indices(list))
        } else {
            Ok(Selector::Index(int(s)?))
        }
    }
}

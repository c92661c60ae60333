//! Fortran unformatted sequential records: `len | payload | len`, in either byte order.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Byte order in which the leading 4-byte marker reads as `expected`.
    pub(crate) fn detect(data: &[u8], expected: i32) -> Option<Endian> {
        let head = data.get(..4)?;
        if LittleEndian::read_i32(head) == expected {
            Some(Endian::Little)
        } else if BigEndian::read_i32(head) == expected {
            Some(Endian::Big)
        } else {
            None
        }
    }

    #[inline(always)]
    pub(crate) fn name(self) -> &'static str {
        match self {
            Endian::Little => "little",
            Endian::Big => "big",
        }
    }

    /// Callers guarantee `buf` holds at least 4 bytes.
    #[inline(always)]
    pub(crate) fn i32(self, buf: &[u8]) -> i32 {
        match self {
            Endian::Little => LittleEndian::read_i32(buf),
            Endian::Big => BigEndian::read_i32(buf),
        }
    }

    #[inline(always)]
    pub(crate) fn f32(self, buf: &[u8]) -> f32 {
        match self {
            Endian::Little => LittleEndian::read_f32(buf),
            Endian::Big => BigEndian::read_f32(buf),
        }
    }

    #[inline(always)]
    pub(crate) fn f64(self, buf: &[u8]) -> f64 {
        match self {
            Endian::Little => LittleEndian::read_f64(buf),
            Endian::Big => BigEndian::read_f64(buf),
        }
    }

    pub(crate) fn f32s(self, buf: &[u8]) -> Vec<f32> {
        let mut out = vec![0.0; buf.len() / 4];
        match self {
            Endian::Little => LittleEndian::read_f32_into(&buf[..out.len() * 4], &mut out),
            Endian::Big => BigEndian::read_f32_into(&buf[..out.len() * 4], &mut out),
        }
        out
    }
}

/// One record located in a byte slice.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block<'a> {
    pub start: usize,
    pub payload: &'a [u8],
    /// Offset just past the trailing marker.
    pub end: usize,
}

pub(crate) fn read_block<'a>(
    data: &'a [u8],
    at: usize,
    endian: Endian,
    format: &'static str,
) -> Result<Block<'a>> {
    let malformed = |reason: String| Error::malformed(format, at as u64, reason);

    let head = data
        .get(at..at + 4)
        .ok_or_else(|| malformed("truncated record marker".to_string()))?;
    let len = endian.i32(head);
    if len < 0 {
        return Err(malformed(format!("negative record length {}", len)));
    }
    let len = len as usize;

    let payload = data
        .get(at + 4..at + 4 + len)
        .ok_or_else(|| malformed(format!("record of {} bytes runs past the end", len)))?;
    let tail = data
        .get(at + 4 + len..at + 8 + len)
        .ok_or_else(|| malformed("missing trailing record marker".to_string()))?;
    if endian.i32(tail) as i64 != len as i64 {
        return Err(malformed(format!(
            "record markers disagree ({} vs {})",
            len,
            endian.i32(tail)
        )));
    }

    tracing::trace!(
        start = format_args!("{:#x}", at),
        len,
        "fortran record"
    );
    Ok(Block {
        start: at,
        payload,
        end: at + 8 + len,
    })
}

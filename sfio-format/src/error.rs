use std::path::PathBuf;

use crate::index::ByteRange;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], for callers that only care about
/// which kind of lookup or conversion went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown or undetectable file/box format, or malformed content.
    Format,
    /// Integer index or slice outside the addressable range.
    Index,
    /// Named section absent from the queried scope.
    Lookup,
    /// Bytes not decodable as text.
    Encoding,
    /// Invalid Box key for reading or writing.
    Key,
    /// Box representation cannot be inferred from the input shape.
    AmbiguousFormat,
    /// The underlying source could not be acquired or written.
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown format '{0}'.")]
    UnknownFormat(String),

    #[error("Cannot detect file format from its name. Path: '{}'", .0.display())]
    UndetectableFormat(PathBuf),

    #[error("Malformed {format} file at byte {offset}: {reason}")]
    Malformed {
        format: &'static str,
        offset: u64,
        reason: String,
    },

    #[error("Cannot cast {format} section '{section}': {reason}")]
    Cast {
        format: &'static str,
        section: String,
        reason: String,
    },

    #[error("Unknown box representation '{0}', choose from basis, lattice, lmpdata, lmpdump or dcd.")]
    UnknownBoxType(String),

    #[error("Invalid number '{0}' in box input.")]
    InvalidNumber(String),

    #[error("Index {index} is out of range for length {len}.")]
    IndexOutOfRange { index: isize, len: usize },

    #[error("Slice step cannot be zero.")]
    ZeroStep,

    #[error("Invalid selection '{0}', expected an index, a start:stop:step slice or a comma separated index list.")]
    InvalidSelector(String),

    #[error("Byte range {range} lies outside a source of {len} bytes.")]
    RangeOutOfBounds { range: ByteRange, len: u64 },

    #[error("Section '{name}' not found, choose from {available:?}.")]
    SectionNotFound { name: String, available: Vec<String> },

    #[error("Bytes {1} are not valid UTF-8.")]
    InvalidEncoding(#[source] std::str::Utf8Error, ByteRange),

    #[error("'{0}' is not a Box input parameter.")]
    NotAnInput(String),

    #[error("'{0}' is not a Box parameter.")]
    UnknownKey(String),

    #[error("Box parameter '{key}' expects {expected}.")]
    KeyType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("Cannot infer box representation from {count} values: {reason}")]
    AmbiguousBoxInput { count: usize, reason: String },

    #[error("Invalid {typ} box input: {reason}")]
    InvalidBox { typ: &'static str, reason: String },

    #[error("Failed to read file. Path: '{}'", .1.display())]
    ReadFailed(#[source] std::io::Error, PathBuf),

    #[error("Failed to write output.")]
    WriteFailed(#[source] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownFormat(_)
            | Error::UndetectableFormat(_)
            | Error::Malformed { .. }
            | Error::Cast { .. }
            | Error::UnknownBoxType(_)
            | Error::InvalidNumber(_)
            | Error::InvalidBox { .. } => ErrorKind::Format,
            Error::IndexOutOfRange { .. }
            | Error::ZeroStep
            | Error::InvalidSelector(_)
            | Error::RangeOutOfBounds { .. } => ErrorKind::Index,
            Error::SectionNotFound { .. } => ErrorKind::Lookup,
            Error::InvalidEncoding(..) => ErrorKind::Encoding,
            Error::NotAnInput(_) | Error::UnknownKey(_) | Error::KeyType { .. } => ErrorKind::Key,
            Error::AmbiguousBoxInput { .. } => ErrorKind::AmbiguousFormat,
            Error::ReadFailed(..) | Error::WriteFailed(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn malformed(format: &'static str, offset: u64, reason: impl Into<String>) -> Error {
        Error::Malformed {
            format,
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn cast(
        format: &'static str,
        section: impl Into<String>,
        reason: impl Into<String>,
    ) -> Error {
        Error::Cast {
            format,
            section: section.into(),
            reason: reason.into(),
        }
    }
}

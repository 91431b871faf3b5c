use std::fmt;

use thiserror::Error;

use crate::vertex::Semantic;

/// The location of a read in the source file for error reporting.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Location {
    /// The byte offset in a binary file.
    Offset(u64),
    /// The 1-based line number in a text file.
    Line(usize),
}

/// The reason a sequential reader stopped producing values.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReadFailure {
    EndOfData,
    InvalidEncoding,
    InvalidToken,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadFailure::EndOfData => write!(f, "unexpected end of data"),
            ReadFailure::InvalidEncoding => write!(f, "invalid UTF-8 string"),
            ReadFailure::InvalidToken => write!(f, "unexpected token"),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Offset(offset) => write!(f, "offset 0x{offset:x}"),
            Location::Line(line) => write!(f, "line {line}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadXpsError {
    #[error("{reason} while reading {section} at {location}")]
    PrematureEndOfFile {
        section: &'static str,
        reason: ReadFailure,
        location: Location,
    },

    #[error("unsupported header version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("error reading file")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("vertex format has no {semantic:?} attribute for layer {layer}")]
pub struct AttributeNotFound {
    pub semantic: Semantic,
    pub layer: u32,
}

#[derive(Debug, Error)]
pub enum ParseObjError {
    #[error("invalid argument on line {line}: {reason}")]
    InvalidArgument { line: usize, reason: String },

    #[error("{kind} index {index} on line {line} is out of range for {count} elements")]
    IndexOutOfRange {
        line: usize,
        kind: &'static str,
        index: i64,
        count: usize,
    },
}

#[derive(Debug, Error)]
pub enum ParseMtlError {
    #[error("invalid argument on line {line}: {reason}")]
    InvalidArgument { line: usize, reason: String },
}

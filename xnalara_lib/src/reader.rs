//! Format agnostic sequential reads for the binary and ASCII model formats.
//!
//! Reads never return errors directly.
//! The first failed read records a [ReadFailure] and its [Location],
//! and every later read returns a zero or empty value without consuming input.
//! Parsing code reads a complete structure and checks [SequentialReader::failure] once at the end.
use std::io::Cursor;

use binrw::{BinRead, BinReaderExt};
use varint_rs::VarintReader;

use crate::error::{Location, ReadFailure};

/// Typed reads shared by [BinaryReader] and [AsciiReader].
pub trait SequentialReader {
    fn read_u8(&mut self) -> u8;
    fn read_u16(&mut self) -> u16;
    fn read_i16(&mut self) -> i16;
    fn read_u32(&mut self) -> u32;
    fn read_f32(&mut self) -> f32;

    /// Read a string prefixed by its length in binary files or the rest of the line in text files.
    fn read_string(&mut self) -> String;

    /// Returns `true` if the current line ended and consumes the line break.
    ///
    /// Binary data has no lines, so this always returns `false`.
    fn consume_newline(&mut self) -> bool {
        false
    }

    /// The reason and location of the first failed read, if any.
    fn failure(&self) -> Option<(ReadFailure, Location)>;

    fn is_valid(&self) -> bool {
        self.failure().is_none()
    }
}

/// Little-endian reads from an in memory buffer.
pub struct BinaryReader<'a> {
    reader: Cursor<&'a [u8]>,
    failure: Option<(ReadFailure, Location)>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: Cursor::new(bytes),
            failure: None,
        }
    }

    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    /// The number of bytes after the current position.
    pub fn remaining(&self) -> u64 {
        (self.reader.get_ref().len() as u64).saturating_sub(self.reader.position())
    }

    /// Skip `count` bytes or fail if fewer bytes remain.
    pub fn skip(&mut self, count: u64) {
        if self.failure.is_some() {
            return;
        }
        if count > self.remaining() {
            self.fail(ReadFailure::EndOfData);
        } else {
            self.reader.set_position(self.reader.position() + count);
        }
    }

    fn fail(&mut self, reason: ReadFailure) {
        if self.failure.is_none() {
            self.failure = Some((reason, Location::Offset(self.reader.position())));
        }
    }

    fn read_value<T>(&mut self) -> T
    where
        for<'b> T: BinRead<Args<'b> = ()> + Default,
    {
        if self.failure.is_some() {
            return T::default();
        }
        let start = self.reader.position();
        match self.reader.read_le() {
            Ok(value) => value,
            Err(_) => {
                self.reader.set_position(start);
                self.fail(ReadFailure::EndOfData);
                T::default()
            }
        }
    }
}

impl SequentialReader for BinaryReader<'_> {
    fn read_u8(&mut self) -> u8 {
        self.read_value()
    }

    fn read_u16(&mut self) -> u16 {
        self.read_value()
    }

    fn read_i16(&mut self) -> i16 {
        self.read_value()
    }

    fn read_u32(&mut self) -> u32 {
        self.read_value()
    }

    fn read_f32(&mut self) -> f32 {
        self.read_value()
    }

    fn read_string(&mut self) -> String {
        if self.failure.is_some() {
            return String::new();
        }

        // The byte length uses a 7-bit variable length encoding.
        let start = self.reader.position();
        let Ok(length) = self.reader.read_u32_varint() else {
            self.reader.set_position(start);
            self.fail(ReadFailure::EndOfData);
            return String::new();
        };

        if length as u64 > self.remaining() {
            self.reader.set_position(start);
            self.fail(ReadFailure::EndOfData);
            return String::new();
        }

        let begin = self.reader.position() as usize;
        let bytes = &self.reader.get_ref()[begin..begin + length as usize];
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                self.reader.set_position((begin + length as usize) as u64);
                text.to_string()
            }
            Err(_) => {
                self.reader.set_position(start);
                self.fail(ReadFailure::InvalidEncoding);
                String::new()
            }
        }
    }

    fn failure(&self) -> Option<(ReadFailure, Location)> {
        self.failure
    }
}

/// Whitespace separated reads from the text of a `.mesh.ascii` file.
///
/// Comments start with `#` and run to the end of the line.
/// Blank lines are skipped between values.
pub struct AsciiReader<'a> {
    text: &'a str,
    position: usize,
    failure: Option<(ReadFailure, Location)>,
}

impl<'a> AsciiReader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            position: 0,
            failure: None,
        }
    }

    /// The 1-based line of the current position.
    pub fn line(&self) -> usize {
        self.text[..self.position].matches('\n').count() + 1
    }

    fn fail(&mut self, reason: ReadFailure) {
        if self.failure.is_none() {
            self.failure = Some((reason, Location::Line(self.line())));
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        let text = self.text;
        loop {
            let rest = &text[self.position..];
            let trimmed = rest.trim_start();
            self.position += rest.len() - trimmed.len();
            if trimmed.starts_with('#') {
                self.position += trimmed.find('\n').unwrap_or(trimmed.len());
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        self.skip_whitespace_and_comments();
        let text = self.text;
        let rest = &text[self.position..];
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '#')
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    }

    fn read_integer(&mut self, min: i64, max: i64) -> i64 {
        if self.failure.is_some() {
            return 0;
        }
        match self.next_token() {
            Some(token) => match token.parse::<i64>() {
                Ok(value) if (min..=max).contains(&value) => {
                    self.position += token.len();
                    value
                }
                _ => {
                    self.fail(ReadFailure::InvalidToken);
                    0
                }
            },
            None => {
                self.fail(ReadFailure::EndOfData);
                0
            }
        }
    }
}

impl SequentialReader for AsciiReader<'_> {
    fn read_u8(&mut self) -> u8 {
        self.read_integer(0, u8::MAX as i64) as u8
    }

    fn read_u16(&mut self) -> u16 {
        // Allow -1 as an alias for the 0xFFFF sentinel.
        self.read_integer(-1, u16::MAX as i64) as u16
    }

    fn read_i16(&mut self) -> i16 {
        self.read_integer(i16::MIN as i64, i16::MAX as i64) as i16
    }

    fn read_u32(&mut self) -> u32 {
        self.read_integer(0, u32::MAX as i64) as u32
    }

    fn read_f32(&mut self) -> f32 {
        if self.failure.is_some() {
            return 0.0;
        }
        match self.next_token() {
            Some(token) => match token.parse::<f32>() {
                Ok(value) => {
                    self.position += token.len();
                    value
                }
                Err(_) => {
                    self.fail(ReadFailure::InvalidToken);
                    0.0
                }
            },
            None => {
                self.fail(ReadFailure::EndOfData);
                0.0
            }
        }
    }

    fn read_string(&mut self) -> String {
        if self.failure.is_some() {
            return String::new();
        }
        self.skip_whitespace_and_comments();

        let text = self.text;
        let rest = &text[self.position..];
        if rest.is_empty() {
            self.fail(ReadFailure::EndOfData);
            return String::new();
        }
        let end = rest.find('\n').unwrap_or(rest.len());
        self.position += end;
        rest[..end].trim_end().to_string()
    }

    fn consume_newline(&mut self) -> bool {
        if self.failure.is_some() {
            return true;
        }

        let text = self.text;
        let rest = &text[self.position..];
        let trimmed = rest.trim_start_matches([' ', '\t']);
        self.position += rest.len() - trimmed.len();

        if trimmed.is_empty() {
            true
        } else if trimmed.starts_with('#') {
            // A comment also ends the line.
            let end = trimmed.find('\n').map(|i| i + 1).unwrap_or(trimmed.len());
            self.position += end;
            true
        } else if trimmed.starts_with("\r\n") {
            self.position += 2;
            true
        } else if trimmed.starts_with(['\n', '\r']) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn failure(&self) -> Option<(ReadFailure, Location)> {
        self.failure
    }
}

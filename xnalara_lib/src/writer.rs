//! Sequential writes mirroring [SequentialReader](crate::reader::SequentialReader).
use std::io::{Seek, Write};

use binrw::{BinResult, BinWriterExt};
use varint_rs::VarintWriter;

/// Typed writes shared by [BinaryWriter] and [AsciiWriter].
pub trait SequentialWriter {
    fn write_u8(&mut self, value: u8) -> BinResult<()>;
    fn write_u16(&mut self, value: u16) -> BinResult<()>;
    fn write_i16(&mut self, value: i16) -> BinResult<()>;
    fn write_u32(&mut self, value: u32) -> BinResult<()>;
    fn write_f32(&mut self, value: f32) -> BinResult<()>;
    fn write_string(&mut self, value: &str) -> BinResult<()>;

    /// End the current group of related values.
    /// Binary data has no lines, so this does nothing by default.
    fn end_line(&mut self) -> BinResult<()> {
        Ok(())
    }
}

pub struct BinaryWriter<W> {
    writer: W,
}

impl<W: Write + Seek> BinaryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Seek> SequentialWriter for BinaryWriter<W> {
    fn write_u8(&mut self, value: u8) -> BinResult<()> {
        self.writer.write_le(&value)
    }

    fn write_u16(&mut self, value: u16) -> BinResult<()> {
        self.writer.write_le(&value)
    }

    fn write_i16(&mut self, value: i16) -> BinResult<()> {
        self.writer.write_le(&value)
    }

    fn write_u32(&mut self, value: u32) -> BinResult<()> {
        self.writer.write_le(&value)
    }

    fn write_f32(&mut self, value: f32) -> BinResult<()> {
        self.writer.write_le(&value)
    }

    fn write_string(&mut self, value: &str) -> BinResult<()> {
        self.writer.write_u32_varint(value.len() as u32)?;
        self.writer.write_all(value.as_bytes())?;
        Ok(())
    }
}

/// Writes values separated by spaces with one group of values per line.
///
/// Floats use the shortest representation that parses back to the same value.
pub struct AsciiWriter<W> {
    writer: W,
    line_started: bool,
}

impl<W: Write> AsciiWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            line_started: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_value<T: std::fmt::Display>(&mut self, value: T) -> BinResult<()> {
        if self.line_started {
            write!(self.writer, " ")?;
        }
        write!(self.writer, "{value}")?;
        self.line_started = true;
        Ok(())
    }
}

impl<W: Write> SequentialWriter for AsciiWriter<W> {
    fn write_u8(&mut self, value: u8) -> BinResult<()> {
        self.write_value(value)
    }

    fn write_u16(&mut self, value: u16) -> BinResult<()> {
        self.write_value(value)
    }

    fn write_i16(&mut self, value: i16) -> BinResult<()> {
        self.write_value(value)
    }

    fn write_u32(&mut self, value: u32) -> BinResult<()> {
        self.write_value(value)
    }

    fn write_f32(&mut self, value: f32) -> BinResult<()> {
        self.write_value(value)
    }

    fn write_string(&mut self, value: &str) -> BinResult<()> {
        // Strings always occupy an entire line.
        self.end_line()?;
        writeln!(self.writer, "{value}")?;
        Ok(())
    }

    fn end_line(&mut self) -> BinResult<()> {
        if self.line_started {
            writeln!(self.writer)?;
            self.line_started = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use hexlit::hex;

    use crate::reader::{AsciiReader, SequentialReader};

    #[test]
    fn write_binary_values() {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        writer.write_u8(1).unwrap();
        writer.write_u16(2).unwrap();
        writer.write_i16(-1).unwrap();
        writer.write_u32(3).unwrap();
        writer.write_f32(1.0).unwrap();
        writer.write_string("root").unwrap();
        assert_eq!(
            hex!(01 0200 ffff 03000000 0000803f 04726f6f74),
            &writer.into_inner().into_inner()[..]
        );
    }

    #[test]
    fn write_ascii_lines() {
        let mut writer = AsciiWriter::new(Vec::new());
        writer.write_u32(2).unwrap();
        writer.end_line().unwrap();
        writer.write_string("root bone").unwrap();
        writer.write_i16(-1).unwrap();
        writer.end_line().unwrap();
        writer.write_f32(0.1).unwrap();
        writer.write_f32(-2.0).unwrap();
        writer.write_f32(f32::NAN).unwrap();
        writer.end_line().unwrap();
        writer.end_line().unwrap();

        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!("2\nroot bone\n-1\n0.1 -2 NaN\n", text);
    }

    #[test]
    fn ascii_floats_parse_back_exactly() {
        let values = [0.1f32, 1.0 / 3.0, -123456.79, f32::MIN_POSITIVE, 1e-8];

        let mut writer = AsciiWriter::new(Vec::new());
        for value in values {
            writer.write_f32(value).unwrap();
        }
        writer.end_line().unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();

        let mut reader = AsciiReader::new(&text);
        for value in values {
            assert_eq!(value.to_bits(), reader.read_f32().to_bits());
        }
        assert!(reader.is_valid());
    }
}

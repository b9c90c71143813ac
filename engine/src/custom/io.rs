//! Binary primitives for the custom-archive codec: variable-width signed
//! integers, length-prefixed strings, and offsets, all sized by the
//! `int_size`/`offset_size` bytes declared in the archive header.

use std::io::{Read, Write};

use crate::error::{ObfuscateError, Result};

#[derive(Debug, Clone, Copy)]
pub struct DumpIo {
    pub int_size: u8,
    pub offset_size: u8,
}

impl Default for DumpIo {
    fn default() -> Self {
        Self {
            int_size: 4,
            offset_size: 8,
        }
    }
}

impl DumpIo {
    pub fn read_byte<R: Read>(&self, r: &mut R) -> Result<u8> {
        let mut buf = [0u8; 1];
        r.read_exact(&mut buf)
            .map_err(|_| ObfuscateError::UnexpectedEof("byte"))?;
        Ok(buf[0])
    }

    /// A sign byte (0 positive, nonzero negative) followed by `int_size`
    /// little-endian magnitude bytes.
    pub fn read_int<R: Read>(&self, r: &mut R) -> Result<i64> {
        let sign = self.read_byte(r)?;
        let mut value: i64 = 0;
        for i in 0..self.int_size {
            let byte = self.read_byte(r)?;
            if byte != 0 {
                value += (byte as i64) << (i * 8);
            }
        }
        Ok(if sign != 0 { -value } else { value })
    }

    pub fn write_int<W: Write>(&self, w: &mut W, value: i64) -> Result<()> {
        let is_negative = value < 0;
        let magnitude = value.unsigned_abs();
        let mut out = Vec::with_capacity(1 + self.int_size as usize);
        out.push(if is_negative { 1 } else { 0 });
        for i in 0..self.int_size {
            out.push(((magnitude >> (i * 8)) & 0xFF) as u8);
        }
        w.write_all(&out)?;
        Ok(())
    }

    /// Unsigned little-endian, `offset_size` bytes, no sign byte.
    pub fn read_offset<R: Read>(&self, r: &mut R) -> Result<u64> {
        let mut offset: u64 = 0;
        for i in 0..self.offset_size {
            let byte = self.read_byte(r)?;
            offset |= (byte as u64) << (i * 8);
        }
        Ok(offset)
    }

    pub fn read_string<R: Read>(&self, r: &mut R) -> Result<String> {
        let length = self.read_int(r)?;
        if length <= 0 {
            return Ok(String::new());
        }
        let mut buf = vec![0u8; length as usize];
        r.read_exact(&mut buf)
            .map_err(|_| ObfuscateError::UnexpectedEof("string"))?;
        String::from_utf8(buf)
            .map_err(|e| ObfuscateError::InvalidCustomFormat(format!("invalid UTF-8 string: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_int() {
        let dio = DumpIo::default();
        for value in [-1_i64, 0, 1, 255, 65536, -123456] {
            let mut buf = Vec::new();
            dio.write_int(&mut buf, value).unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            assert_eq!(dio.read_int(&mut cursor).unwrap(), value);
        }
    }
}

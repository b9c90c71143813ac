//! `PGDMP` archive header parsing.

use std::io::Read;

use crate::error::{ObfuscateError, Result};

use super::io::DumpIo;

pub const MAGIC: &[u8; 5] = b"PGDMP";
pub const CUSTOM_FORMAT_BYTE: u8 = 1;

pub type Version = (u8, u8, u8);

const MIN_VERSION: Version = (1, 12, 0);
const MAX_VERSION: Version = (1, 16, 0);
const TABLEAM_VERSION: Version = (1, 14, 0);
const COMPRESSION_BYTE_VERSION: Version = (1, 15, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Lz4,
    Zlib,
}

#[derive(Debug, Clone)]
pub struct Header {
    pub version: Version,
    pub int_size: u8,
    pub offset_size: u8,
    pub compression: Compression,
    pub database_name: String,
    pub server_version: String,
    pub pgdump_version: String,
}

pub fn supports_tableam(version: Version) -> bool {
    version >= TABLEAM_VERSION
}

pub fn parse_header<R: Read>(r: &mut R) -> Result<(Header, DumpIo)> {
    let mut magic = [0u8; 5];
    r.read_exact(&mut magic)
        .map_err(|_| ObfuscateError::UnexpectedEof("magic header"))?;
    if &magic != MAGIC {
        return Err(ObfuscateError::InvalidCustomFormat(format!(
            "invalid magic header: {magic:?}"
        )));
    }

    let mut dio = DumpIo::default();
    let version = (
        dio.read_byte(r)?,
        dio.read_byte(r)?,
        dio.read_byte(r)?,
    );
    if version < MIN_VERSION || version > MAX_VERSION {
        return Err(ObfuscateError::UnsupportedVersion(
            version.0, version.1, version.2,
        ));
    }

    dio.int_size = dio.read_byte(r)?;
    dio.offset_size = dio.read_byte(r)?;

    let format_byte = dio.read_byte(r)?;
    if format_byte != CUSTOM_FORMAT_BYTE {
        return Err(ObfuscateError::InvalidCustomFormat(format!(
            "unsupported format byte: {format_byte}"
        )));
    }

    let compression = parse_compression(r, &dio, version)?;
    parse_creation_date(r, &dio)?;

    let database_name = dio.read_string(r)?;
    let server_version = dio.read_string(r)?;
    let pgdump_version = dio.read_string(r)?;

    Ok((
        Header {
            version,
            int_size: dio.int_size,
            offset_size: dio.offset_size,
            compression,
            database_name,
            server_version,
            pgdump_version,
        },
        dio,
    ))
}

fn parse_compression<R: Read>(r: &mut R, dio: &DumpIo, version: Version) -> Result<Compression> {
    if version >= COMPRESSION_BYTE_VERSION {
        let byte = dio.read_byte(r)?;
        match byte {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Lz4),
            3 => Ok(Compression::Zlib),
            other => Err(ObfuscateError::UnsupportedCompression(format!(
                "unknown compression byte {other}"
            ))),
        }
    } else {
        let value = dio.read_int(r)?;
        match value {
            -1 => Ok(Compression::Zlib),
            0 => Ok(Compression::None),
            1..=9 => Ok(Compression::Gzip),
            other => Err(ObfuscateError::UnsupportedCompression(format!(
                "invalid compression level {other}"
            ))),
        }
    }
}

/// Seven signed ints: sec, min, hour, day, month, year, isdst. The engine
/// has no use for the creation timestamp itself; only the byte count
/// consumed matters for the header/TOC framing rule.
fn parse_creation_date<R: Read>(r: &mut R, dio: &DumpIo) -> Result<()> {
    for _ in 0..7 {
        dio.read_int(r)?;
    }
    Ok(())
}

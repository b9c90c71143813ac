//! `PGDMP` custom-archive codec: parses enough of a `pg_dump -Fc` archive
//! to locate and rewrite each `TABLE DATA` block while preserving every
//! other byte exactly, with bounded memory even for multi-gigabyte
//! blocks.

mod codec;
mod header;
mod io;
mod linebuf;
mod toc;

use std::io::{Cursor, Read, Write};
use std::path::Path;

pub use header::{Compression, Header, Version, MAGIC};
pub use toc::TocEntry;

use crate::error::{ObfuscateError, Result};
use crate::obfuscator::LineObfuscator;

use io::DumpIo;

const HEADER_PROBE_CHUNK: usize = 1024 * 1024;

/// Parse and rewrite a complete `PGDMP` archive from `input`, writing the
/// transformed archive to `output`.
pub fn process_stream<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    let (dump_header, dio, toc, leftover) = parse_header_and_toc(input, output)?;

    let mut combined = CombinedReader::new(leftover, input);
    codec::process_data_blocks(
        &mut combined,
        output,
        &dio,
        dump_header.compression,
        &toc,
        obfuscator,
        tmp_dir,
        tmp_prefix,
    )
}

/// Accumulate input until the header and TOC parse successfully, then
/// write the exact consumed byte range to `output` and return whatever
/// trailing bytes were over-read so they can be replayed ahead of the
/// rest of the input stream.
fn parse_header_and_toc<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<(Header, DumpIo, Vec<TocEntry>, Vec<u8>)> {
    let mut buffer: Vec<u8> = Vec::new();
    let mut probe = vec![0u8; HEADER_PROBE_CHUNK];

    loop {
        let n = input.read(&mut probe)?;
        if n == 0 {
            return Err(ObfuscateError::UnexpectedEof("header/TOC"));
        }
        buffer.extend_from_slice(&probe[..n]);

        let mut cursor = Cursor::new(&buffer);
        let parsed = header::parse_header(&mut cursor).and_then(|(header, dio)| {
            toc::parse_toc(&mut cursor, &dio, header.version).map(|toc| (header, dio, toc))
        });

        if let Ok((header, dio, toc)) = parsed {
            let consumed = cursor.position() as usize;
            output.write_all(&buffer[..consumed])?;
            let leftover = buffer[consumed..].to_vec();
            return Ok((header, dio, toc, leftover));
        }
    }
}

/// Replays bytes over-read while probing the header/TOC boundary before
/// falling through to the live input stream — equivalent to chaining two
/// readers end to end.
struct CombinedReader<'a, R: Read> {
    leftover: Cursor<Vec<u8>>,
    inner: &'a mut R,
}

impl<'a, R: Read> CombinedReader<'a, R> {
    fn new(leftover: Vec<u8>, inner: &'a mut R) -> Self {
        Self {
            leftover: Cursor::new(leftover),
            inner,
        }
    }
}

impl<'a, R: Read> Read for CombinedReader<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if (self.leftover.position() as usize) < self.leftover.get_ref().len() {
            let n = self.leftover.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
        }
        self.inner.read(buf)
    }
}

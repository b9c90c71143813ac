//! Data-block transformation: the zlib and uncompressed transform-mode
//! pipelines, pass-through copying, and the line-rewrite step shared by
//! both.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use flate2::{Compress, Compression as Flate2Level, Decompress, FlushCompress, FlushDecompress, Status};
use tempfile::NamedTempFile;

use crate::error::{ObfuscateError, Result};
use crate::obfuscator::LineObfuscator;

use super::header::Compression;
use super::io::DumpIo;
use super::linebuf::StreamingLineBuffer;
use super::toc::TocEntry;

const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;
const MAX_CHUNK_SIZE: i64 = 50 * 1024 * 1024;
const PROCESSING_BUFFER_SIZE: usize = 64 * 1024;
const COMPRESSION_BUFFER_SIZE: usize = 32 * 1024;
const COMPRESSION_LEVEL: u32 = 6;
const STREAM_WRITE_THRESHOLD: i64 = 10 * 1024 * 1024;

const DATA_BLOCK: u8 = 0x01;
const BLOBS_BLOCK: u8 = 0x02;
const END_BLOCK: u8 = 0x04;

/// Runs every complete line in `chunk` through the line obfuscator,
/// joining the (possibly dropped) results back with `\n` exactly as the
/// plain-text rewriter would. Falls back to passing `chunk` through
/// unchanged if it is not valid UTF-8.
fn process_data_chunk(obfuscator: &mut LineObfuscator, chunk: &[u8]) -> Result<Vec<u8>> {
    let Ok(text) = std::str::from_utf8(chunk) else {
        return Ok(chunk.to_vec());
    };

    let mut rewritten_lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            rewritten_lines.push(String::new());
            continue;
        }
        if let Some(rewritten) = obfuscator.parse_line(line)? {
            rewritten_lines.push(rewritten);
        }
    }
    Ok(rewritten_lines.join("\n").into_bytes())
}

/// Pre-scan the TOC: register every `COMMENT` directive and every
/// `TABLE DATA` entry's `COPY` header with the obfuscator before any
/// data block is transformed. Parse errors during the pre-scan are
/// suppressed (mirrors the tolerant directive-parse contract).
pub fn prescan_toc(obfuscator: &mut LineObfuscator, toc: &[TocEntry]) {
    let mut seen = HashSet::new();
    for entry in toc.iter().filter(|e| e.is_comment()) {
        if let Some(defn) = &entry.defn {
            if seen.insert(defn.clone()) {
                let _ = obfuscator.parse_line(defn);
            }
        }
    }
    for entry in toc.iter().filter(|e| e.is_table_data()) {
        if let Some(copy_stmt) = &entry.copy_stmt {
            let _ = obfuscator.parse_line(copy_stmt);
        }
    }
}

pub fn table_data_copy_stmts(toc: &[TocEntry]) -> HashMap<i64, String> {
    toc.iter()
        .filter(|e| e.is_table_data())
        .filter_map(|e| e.copy_stmt.clone().map(|c| (e.dump_id, c)))
        .collect()
}

/// Drive the block loop: dispatch each block to transform mode,
/// pass-through, or raw forwarding, until the `END` block or EOF.
#[allow(clippy::too_many_arguments)]
pub fn process_data_blocks<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    compression: Compression,
    toc: &[TocEntry],
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    prescan_toc(obfuscator, toc);
    let copy_stmts = table_data_copy_stmts(toc);
    let transformable_ids: HashSet<i64> = copy_stmts.keys().copied().collect();

    loop {
        let mut block_type = [0u8; 1];
        let n = input.read(&mut block_type)?;
        if n == 0 {
            break;
        }

        match block_type[0] {
            DATA_BLOCK => {
                let dump_id = dio.read_int(input)?;
                if transformable_ids.contains(&dump_id) {
                    // Blocks don't arrive in TOC order and the prescan above
                    // leaves row context pointed at whichever table's COPY
                    // header it parsed last; re-parse this block's own
                    // header so row context (table, columns, delete flag)
                    // matches the bytes about to be transformed.
                    let _ = obfuscator.parse_line(&copy_stmts[&dump_id]);
                    process_block(
                        input, output, dio, dump_id, compression, obfuscator, tmp_dir, tmp_prefix,
                    )?;
                } else {
                    pass_through_block(input, output, dio, DATA_BLOCK, dump_id, compression)?;
                }
            }
            BLOBS_BLOCK => {
                let dump_id = dio.read_int(input)?;
                pass_through_block(input, output, dio, BLOBS_BLOCK, dump_id, compression)?;
            }
            END_BLOCK => {
                output.write_all(&block_type)?;
                break;
            }
            other => {
                output.write_all(&[other])?;
            }
        }
    }

    Ok(())
}

/// Copies one DATA or BLOBS block through byte for byte, without decoding
/// its payload. The framing depends on the archive's compression scheme
/// (see the framing invariants in [`super`]'s module docs): ZLIB blocks are
/// a list of `(int chunk_size)(bytes)` frames ending in a zero-size
/// terminator, while every other scheme (none, gzip, lz4) is a single
/// `(int size)(size bytes)` pair.
fn pass_through_block<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    block_type: u8,
    dump_id: i64,
    compression: Compression,
) -> Result<()> {
    output.write_all(&[block_type])?;
    dio.write_int(output, dump_id)?;

    match compression {
        Compression::Zlib => pass_through_zlib_frames(input, output, dio),
        _ => pass_through_single_frame(input, output, dio),
    }
}

fn pass_through_zlib_frames<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
) -> Result<()> {
    loop {
        let chunk_size = dio.read_int(input)?;
        dio.write_int(output, chunk_size)?;
        if chunk_size == 0 {
            return Ok(());
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(ObfuscateError::ChunkTooLarge {
                size: chunk_size,
                cap: MAX_CHUNK_SIZE,
            });
        }
        copy_exact(input, output, chunk_size)?;
    }
}

fn pass_through_single_frame<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
) -> Result<()> {
    let size = dio.read_int(input)?;
    dio.write_int(output, size)?;
    copy_exact(input, output, size)
}

fn copy_exact<R: Read, W: Write>(input: &mut R, output: &mut W, size: i64) -> Result<()> {
    let mut remaining = size;
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    while remaining > 0 {
        let want = (DEFAULT_BUFFER_SIZE as i64).min(remaining) as usize;
        let read = input.read(&mut buf[..want])?;
        if read == 0 {
            return Err(ObfuscateError::UnexpectedEof("block data"));
        }
        output.write_all(&buf[..read])?;
        remaining -= read as i64;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn process_block<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    dump_id: i64,
    compression: Compression,
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    match compression {
        Compression::Zlib => {
            process_compressed_block(input, output, dio, dump_id, obfuscator, tmp_dir, tmp_prefix)
        }
        Compression::None => {
            process_uncompressed_block(input, output, dio, dump_id, obfuscator, tmp_dir, tmp_prefix)
        }
        other => Err(ObfuscateError::UnsupportedCompression(format!(
            "{other:?} data blocks cannot be transformed"
        ))),
    }
}

fn named_temp_file(dir: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!("{prefix}{suffix}_"))
        .tempfile_in(dir)
        .map_err(ObfuscateError::Io)
}

fn process_compressed_block<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    dump_id: i64,
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    let mut decompressed = named_temp_file(tmp_dir, tmp_prefix, "decomp")?;
    let mut processed = named_temp_file(tmp_dir, tmp_prefix, "proc")?;

    stream_decompress(input, dio, decompressed.as_file_mut())?;
    decompressed.as_file_mut().seek(SeekFrom::Start(0))?;

    stream_process_lines(decompressed.as_file_mut(), processed.as_file_mut(), obfuscator)?;
    processed.as_file_mut().seek(SeekFrom::Start(0))?;

    stream_compress_and_write(processed.as_file_mut(), output, dio, dump_id)?;

    Ok(())
}

fn stream_decompress<R: Read, W: Write>(input: &mut R, dio: &DumpIo, output: &mut W) -> Result<()> {
    let mut decompressor = Decompress::new(true);
    let mut out_buf = vec![0u8; PROCESSING_BUFFER_SIZE];

    loop {
        let chunk_size = dio.read_int(input)?;
        if chunk_size == 0 {
            break;
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(ObfuscateError::ChunkTooLarge {
                size: chunk_size,
                cap: MAX_CHUNK_SIZE,
            });
        }

        let mut chunk = vec![0u8; chunk_size as usize];
        input
            .read_exact(&mut chunk)
            .map_err(|_| ObfuscateError::UnexpectedEof("zlib chunk"))?;

        decompress_fully(&mut decompressor, &chunk, &mut out_buf, output)?;
    }

    flush_decompress(&mut decompressor, &mut out_buf, output)?;
    Ok(())
}

fn decompress_fully<W: Write>(
    decompressor: &mut Decompress,
    input: &[u8],
    out_buf: &mut [u8],
    sink: &mut W,
) -> Result<()> {
    let mut offset = 0usize;
    while offset < input.len() {
        let before_in = decompressor.total_in();
        let before_out = decompressor.total_out();
        let status = decompressor
            .decompress(&input[offset..], out_buf, FlushDecompress::None)
            .map_err(|e| ObfuscateError::DecompressionError(e.to_string()))?;

        let consumed = (decompressor.total_in() - before_in) as usize;
        let produced = (decompressor.total_out() - before_out) as usize;
        if produced > 0 {
            sink.write_all(&out_buf[..produced])?;
        }
        offset += consumed;

        if status == Status::StreamEnd {
            break;
        }
        if consumed == 0 && produced == 0 {
            break;
        }
    }
    Ok(())
}

fn flush_decompress<W: Write>(
    decompressor: &mut Decompress,
    out_buf: &mut [u8],
    sink: &mut W,
) -> Result<()> {
    loop {
        let before_out = decompressor.total_out();
        let status = decompressor
            .decompress(&[], out_buf, FlushDecompress::Finish)
            .map_err(|e| ObfuscateError::DecompressionError(e.to_string()))?;
        let produced = (decompressor.total_out() - before_out) as usize;
        if produced > 0 {
            sink.write_all(&out_buf[..produced])?;
        }
        if status == Status::StreamEnd || produced == 0 {
            break;
        }
    }
    Ok(())
}

fn stream_process_lines<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    obfuscator: &mut LineObfuscator,
) -> Result<()> {
    let mut line_buffer = StreamingLineBuffer::new();
    let mut read_buf = vec![0u8; PROCESSING_BUFFER_SIZE];

    loop {
        let n = input.read(&mut read_buf)?;
        if n == 0 {
            let remaining = line_buffer.take_remaining();
            if !remaining.is_empty() {
                let processed = process_data_chunk(obfuscator, &remaining)?;
                if !processed.is_empty() {
                    output.write_all(&processed)?;
                }
            }
            break;
        }

        let complete_lines = line_buffer.add_chunk(&read_buf[..n]);
        if !complete_lines.is_empty() {
            let processed = process_data_chunk(obfuscator, &complete_lines)?;
            if !processed.is_empty() {
                output.write_all(&processed)?;
            }
        }
    }

    Ok(())
}

fn stream_compress_and_write<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    dump_id: i64,
) -> Result<()> {
    let mut compressor = Compress::new(Flate2Level::new(COMPRESSION_LEVEL), true);

    output.write_all(&[DATA_BLOCK])?;
    dio.write_int(output, dump_id)?;

    let mut in_buf = vec![0u8; COMPRESSION_BUFFER_SIZE];
    let mut out_buf = vec![0u8; COMPRESSION_BUFFER_SIZE.max(PROCESSING_BUFFER_SIZE)];

    loop {
        let n = input.read(&mut in_buf)?;
        if n == 0 {
            break;
        }
        compress_fully(&mut compressor, &in_buf[..n], &mut out_buf, output, dio)?;
    }

    flush_compress(&mut compressor, &mut out_buf, output, dio)?;
    dio.write_int(output, 0)?;

    Ok(())
}

fn compress_fully<W: Write>(
    compressor: &mut Compress,
    input: &[u8],
    out_buf: &mut [u8],
    output: &mut W,
    dio: &DumpIo,
) -> Result<()> {
    let mut offset = 0usize;
    while offset < input.len() {
        let before_in = compressor.total_in();
        let before_out = compressor.total_out();
        let status = compressor
            .compress(&input[offset..], out_buf, FlushCompress::None)
            .map_err(|e| ObfuscateError::CompressionError(e.to_string()))?;

        let consumed = (compressor.total_in() - before_in) as usize;
        let produced = (compressor.total_out() - before_out) as usize;
        if produced > 0 {
            dio.write_int(output, produced as i64)?;
            output.write_all(&out_buf[..produced])?;
        }
        offset += consumed;

        if status == Status::StreamEnd {
            break;
        }
        if consumed == 0 && produced == 0 {
            break;
        }
    }
    Ok(())
}

fn flush_compress<W: Write>(
    compressor: &mut Compress,
    out_buf: &mut [u8],
    output: &mut W,
    dio: &DumpIo,
) -> Result<()> {
    loop {
        let before_out = compressor.total_out();
        let status = compressor
            .compress(&[], out_buf, FlushCompress::Finish)
            .map_err(|e| ObfuscateError::CompressionError(e.to_string()))?;
        let produced = (compressor.total_out() - before_out) as usize;
        if produced > 0 {
            dio.write_int(output, produced as i64)?;
            output.write_all(&out_buf[..produced])?;
        }
        if status == Status::StreamEnd || produced == 0 {
            break;
        }
    }
    Ok(())
}

fn process_uncompressed_block<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    dump_id: i64,
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    let size = dio.read_int(input)?;

    if size > STREAM_WRITE_THRESHOLD {
        process_uncompressed_streaming(input, output, dio, dump_id, size, obfuscator, tmp_dir, tmp_prefix)
    } else {
        let mut data = vec![0u8; size.max(0) as usize];
        input
            .read_exact(&mut data)
            .map_err(|_| ObfuscateError::UnexpectedEof("uncompressed block"))?;
        let processed = process_data_chunk(obfuscator, &data)?;
        output.write_all(&[DATA_BLOCK])?;
        dio.write_int(output, dump_id)?;
        dio.write_int(output, processed.len() as i64)?;
        output.write_all(&processed)?;
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn process_uncompressed_streaming<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    dio: &DumpIo,
    dump_id: i64,
    total_size: i64,
    obfuscator: &mut LineObfuscator,
    tmp_dir: &Path,
    tmp_prefix: &str,
) -> Result<()> {
    let mut processed_file = named_temp_file(tmp_dir, tmp_prefix, "uncompressed")?;

    {
        let file = processed_file.as_file_mut();
        let mut line_buffer = StreamingLineBuffer::new();
        let mut remaining = total_size;
        let mut buf = vec![0u8; PROCESSING_BUFFER_SIZE];

        while remaining > 0 {
            let want = (PROCESSING_BUFFER_SIZE as i64).min(remaining) as usize;
            input
                .read_exact(&mut buf[..want])
                .map_err(|_| ObfuscateError::UnexpectedEof("uncompressed streaming block"))?;
            remaining -= want as i64;

            let complete_lines = line_buffer.add_chunk(&buf[..want]);
            if !complete_lines.is_empty() {
                let processed = process_data_chunk(obfuscator, &complete_lines)?;
                if !processed.is_empty() {
                    file.write_all(&processed)?;
                }
            }
        }

        let remainder = line_buffer.take_remaining();
        if !remainder.is_empty() {
            let processed = process_data_chunk(obfuscator, &remainder)?;
            if !processed.is_empty() {
                file.write_all(&processed)?;
            }
        }
        file.flush()?;
    }

    let file_size = processed_file.as_file().metadata()?.len();
    output.write_all(&[DATA_BLOCK])?;
    dio.write_int(output, dump_id)?;
    dio.write_int(output, file_size as i64)?;

    processed_file.as_file_mut().seek(SeekFrom::Start(0))?;
    std::io::copy(processed_file.as_file_mut(), output)?;

    Ok(())
}

//! Error types for the obfuscation engine.
//!
//! All fatal errors that can occur while parsing a directive, rewriting a
//! plain dump, or decoding/re-encoding a custom-format archive are
//! represented by [`ObfuscateError`]. Tolerant conditions (malformed `anon:`
//! JSON, unknown table-level mutation names, invalid UTF-8 inside a data
//! chunk) are never represented here — they are handled inline by returning
//! the original input unchanged.

use thiserror::Error;

/// Primary error type for the engine.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    /// A column directive referenced a mutation name not in the registry.
    #[error("unknown mutation: {0}")]
    UnknownMutation(String),

    /// A relation lookup found a relation key with no corresponding
    /// replacement value. Indicates relation-store corruption.
    #[error("invalid relation key: {0}")]
    InvalidRelationKey(String),

    /// A `unique`-flagged generator exceeded its retry budget without
    /// producing a value absent from the run's unique set.
    #[error("uniqueness exhausted for mutation {mutation} after {attempts} attempts")]
    UniquenessExhausted { mutation: String, attempts: u32 },

    /// A generator failed to produce a value (e.g. missing required kwarg).
    #[error("generator failure in mutation {mutation}: {reason}")]
    GeneratorFailure { mutation: String, reason: String },

    /// The custom-format archive violated its binary contract: bad magic,
    /// malformed TOC entry, invalid format byte, and similar.
    #[error("invalid custom-format archive: {0}")]
    InvalidCustomFormat(String),

    /// Archive version is outside the supported `[1.12.0, 1.16.0]` range.
    #[error("unsupported archive version: {0}.{1}.{2}")]
    UnsupportedVersion(u8, u8, u8),

    /// Declared or required compression scheme cannot be decoded (LZ4,
    /// gzip data blocks, or an unrecognized compression byte).
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(String),

    /// Stream ended while a framed structure (string, TOC entry, chunk) was
    /// still being read.
    #[error("unexpected EOF while reading {0}")]
    UnexpectedEof(&'static str),

    /// A single zlib-framed chunk exceeded the configured safety cap.
    #[error("chunk too large: {size} bytes exceeds cap of {cap} bytes")]
    ChunkTooLarge { size: i64, cap: i64 },

    /// zlib inflate failed.
    #[error("decompression error: {0}")]
    DecompressionError(String),

    /// zlib deflate failed.
    #[error("compression error: {0}")]
    CompressionError(String),

    /// Underlying I/O error (stdin/stdout/temp-file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ObfuscateError>;

//! Streaming obfuscation engine for PostgreSQL logical dumps.
//!
//! Two entry points cover the two dump shapes `pg_dump` can produce: the
//! plain-text `-Fp`/`-Fc`-uncompressed-TOC line stream, rewritten line by
//! line through [`LineObfuscator::parse_line`], and the binary
//! `pg_dump -Fc` custom archive, rewritten block by block through
//! [`custom::process_stream`] while every other byte is preserved
//! exactly.

pub mod condition;
pub mod custom;
pub mod directive;
pub mod error;
pub mod generator;
pub mod obfuscator;
pub mod relation;

pub use error::{ObfuscateError, Result};
pub use obfuscator::LineObfuscator;

/// The five-byte magic that opens every `pg_dump -Fc` custom archive.
pub const CUSTOM_FORMAT_MAGIC: &[u8; 5] = custom::MAGIC;

/// Sniff whether a byte prefix looks like the start of a custom-format
/// archive, so a driver can choose between the plain-text line rewriter
/// and the binary codec without buffering the whole input.
pub fn looks_like_custom_format(prefix: &[u8]) -> bool {
    prefix.len() >= CUSTOM_FORMAT_MAGIC.len() && &prefix[..CUSTOM_FORMAT_MAGIC.len()] == CUSTOM_FORMAT_MAGIC
}

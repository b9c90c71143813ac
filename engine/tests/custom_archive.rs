//! End-to-end tests against hand-built `PGDMP` custom-archive bytes,
//! exercising the header/TOC framing rule and the data-block rewriter
//! without needing a real `pg_dump` binary on hand.

use std::io::Cursor;

use pg_stage_core::custom::process_stream;
use pg_stage_core::LineObfuscator;

/// Minimal writer for the custom-archive wire format (`int_size = 4`,
/// `offset_size = 8`), mirroring the engine's own `DumpIo` encoding.
struct ArchiveWriter {
    buf: Vec<u8>,
}

impl ArchiveWriter {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn byte(&mut self, b: u8) -> &mut Self {
        self.buf.push(b);
        self
    }

    fn int(&mut self, value: i64) -> &mut Self {
        let negative = value < 0;
        let magnitude = value.unsigned_abs();
        self.buf.push(if negative { 1 } else { 0 });
        for i in 0..4 {
            self.buf.push(((magnitude >> (i * 8)) & 0xFF) as u8);
        }
        self
    }

    fn offset(&mut self, value: u64) -> &mut Self {
        for i in 0..8 {
            self.buf.push(((value >> (i * 8)) & 0xFF) as u8);
        }
        self
    }

    fn string(&mut self, s: &str) -> &mut Self {
        self.int(s.len() as i64);
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    fn header(&mut self, version: (u8, u8, u8), compression_byte: Option<u8>, compression_level: Option<i64>) -> &mut Self {
        self.buf.extend_from_slice(b"PGDMP");
        self.byte(version.0).byte(version.1).byte(version.2);
        self.byte(4).byte(8); // int_size, offset_size
        self.byte(1); // custom format
        if let Some(b) = compression_byte {
            self.byte(b);
        } else if let Some(level) = compression_level {
            self.int(level);
        }
        for _ in 0..7 {
            self.int(0); // creation date fields, unused by the engine
        }
        self.string("testdb").string("17.0").string("1.15.0")
    }

    /// One `TABLE DATA` entry plus the surrounding TOC entry count. Only
    /// the single entry is emitted; callers needing more entries should
    /// build the TOC by hand.
    fn table_data_entry(
        &mut self,
        dump_id: i64,
        copy_stmt: &str,
        supports_tableam: bool,
    ) -> &mut Self {
        self.int(dump_id); // dump_id
        self.int(0); // had_dumper
        self.string("16400"); // table_oid
        self.string("16401"); // oid
        self.string("my_table"); // tag
        self.string("TABLE DATA"); // desc
        self.int(2); // section: data
        self.string(""); // defn
        self.string(""); // drop_stmt
        self.string(copy_stmt); // copy_stmt
        self.string("public"); // namespace
        self.string(""); // tablespace
        if supports_tableam {
            self.string("heap");
        }
        self.string("postgres"); // owner
        self.string("false"); // with_oids
        self.string(""); // dependency list terminator
        self.byte(0); // data_state
        self.offset(0) // offset
    }

    fn comment_entry(&mut self, dump_id: i64, defn: &str, supports_tableam: bool) -> &mut Self {
        self.int(dump_id);
        self.int(0);
        self.string("");
        self.string("16402");
        self.string("COLUMN t.email");
        self.string("COMMENT");
        self.int(3); // post-data
        self.string(defn);
        self.string("");
        self.string("");
        self.string("public");
        self.string("");
        if supports_tableam {
            self.string("");
        }
        self.string("postgres");
        self.string("");
        self.string("");
        self.byte(0);
        self.offset(0)
    }

    fn uncompressed_data_block(&mut self, dump_id: i64, payload: &[u8]) -> &mut Self {
        self.byte(0x01);
        self.int(dump_id);
        self.int(payload.len() as i64);
        self.buf.extend_from_slice(payload);
        self
    }

    fn end_block(&mut self) -> &mut Self {
        self.byte(0x04)
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

fn obfuscator() -> LineObfuscator {
    LineObfuscator::new('\t', 1, "en_US", vec![])
}

#[test]
fn round_trips_archive_with_no_directives() {
    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(0), None);
    w.int(1); // one TOC entry
    w.table_data_entry(1, "COPY t (id, val) FROM stdin;\n", true);
    w.uncompressed_data_block(1, b"1\tunchanged\n\\.\n");
    w.end_block();
    let archive = w.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive.clone()),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    assert_eq!(output, archive);
}

#[test]
fn rewrites_uncompressed_table_data_block_per_directives() {
    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(0), None);
    w.int(2); // two TOC entries: a COMMENT and the TABLE DATA
    w.comment_entry(
        1,
        "COMMENT ON COLUMN t.email IS 'anon: [{\"mutation_name\":\"null\"}]';",
        true,
    );
    w.table_data_entry(2, "COPY t (id, email) FROM stdin;\n", true);
    w.uncompressed_data_block(2, b"1\tfoo@x\n2\tbar@y\n\\.\n");
    w.end_block();
    let archive = w.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1\t\\N\n"));
    assert!(text.contains("2\t\\N\n"));
    assert!(!text.contains("foo@x"));
    assert!(!text.contains("bar@y"));
    assert!(text.contains("\\.\n"));
}

#[test]
fn passes_through_table_without_directives_unchanged() {
    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(0), None);
    w.int(1);
    w.table_data_entry(1, "COPY untouched (id, val) FROM stdin;\n", true);
    let payload = b"1\tsome value\n2\tanother value\n\\.\n";
    w.uncompressed_data_block(1, payload);
    w.end_block();
    let archive = w.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1\tsome value\n"));
    assert!(text.contains("2\tanother value\n"));
}

#[test]
fn old_version_uses_signed_int_compression_field() {
    let mut w = ArchiveWriter::new();
    w.header((1, 12, 0), None, Some(0)); // 1.12 predates tableam and the byte compression field
    w.int(1);
    w.table_data_entry(1, "COPY t (id, val) FROM stdin;\n", false);
    w.uncompressed_data_block(1, b"1\tx\n\\.\n");
    w.end_block();
    let archive = w.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive.clone()),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    assert_eq!(output, archive);
}

/// Two tables with different column layouts and directives, with the TOC
/// listing them in one order but the data blocks arriving in the reverse
/// order — row context for each block must come from that block's own
/// COPY header, not whichever table's header the TOC prescan parsed last.
#[test]
fn multi_table_blocks_use_their_own_row_context_regardless_of_order() {
    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(0), None);
    w.int(2);
    w.table_data_entry(10, "COPY users (id, email) FROM stdin;\n", true);
    w.comment_entry(
        11,
        "COMMENT ON COLUMN users.email IS 'anon: [{\"mutation_name\":\"null\"}]';",
        true,
    );
    w.table_data_entry(20, "COPY orders (order_id, total, note) FROM stdin;\n", true);
    let archive_header_and_toc = w.finish();

    // Blocks in reverse-of-TOC order: orders first, then users.
    let mut w2 = ArchiveWriter { buf: archive_header_and_toc };
    w2.uncompressed_data_block(20, b"1\t9.99\tfirst order\n\\.\n");
    w2.uncompressed_data_block(10, b"1\tjane@corp.com\n\\.\n");
    w2.end_block();
    let archive = w2.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1\t9.99\tfirst order\n"));
    assert!(text.contains("1\t\\N\n"));
    assert!(!text.contains("jane@corp.com"));
}

#[test]
fn rewrites_zlib_compressed_table_data_block() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression as Flate2Level;
    use std::io::Write as _;

    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(3), None); // compression byte 3 = zlib
    w.int(1);
    w.table_data_entry(1, "COPY t (id, email) FROM stdin;\n", true);

    let rows = b"1\tfoo@x\n2\tbar@y\n\\.\n";
    let mut encoder = ZlibEncoder::new(Vec::new(), Flate2Level::new(6));
    encoder.write_all(rows).unwrap();
    let compressed = encoder.finish().unwrap();

    w.byte(0x01);
    w.int(1);
    w.int(compressed.len() as i64);
    w.buf.extend_from_slice(&compressed);
    w.int(0); // zero-length chunk terminates the frame sequence
    w.end_block();
    let archive = w.finish();

    let mut ob = obfuscator();
    ob.parse_line("COMMENT ON COLUMN t.email IS 'anon: [{\"mutation_name\":\"null\"}]';")
        .unwrap();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive),
        &mut output,
        &mut ob,
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("1\t\\N\n"));
    assert!(text.contains("2\t\\N\n"));
    assert!(!text.contains("foo@x"));
}

#[test]
fn passes_through_zlib_compressed_block_with_no_directives() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression as Flate2Level;
    use std::io::Write as _;

    let mut w = ArchiveWriter::new();
    w.header((1, 15, 0), Some(3), None);
    w.int(1);
    w.table_data_entry(1, "COPY untouched (id, val) FROM stdin;\n", true);

    let rows = b"1\tleave me alone\n\\.\n";
    let mut encoder = ZlibEncoder::new(Vec::new(), Flate2Level::new(6));
    encoder.write_all(rows).unwrap();
    let compressed = encoder.finish().unwrap();

    w.byte(0x01);
    w.int(1);
    w.int(compressed.len() as i64);
    w.buf.extend_from_slice(&compressed);
    w.int(0);
    w.end_block();
    let archive = w.finish();

    let mut output = Vec::new();
    process_stream(
        &mut Cursor::new(archive.clone()),
        &mut output,
        &mut obfuscator(),
        std::env::temp_dir().as_path(),
        "pg_stage_test_",
    )
    .unwrap();

    assert_eq!(output, archive);
}

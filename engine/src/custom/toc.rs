//! Table of Contents parsing.

use std::io::Read;

use crate::error::Result;

use super::header::{supports_tableam, Version};
use super::io::DumpIo;

#[derive(Debug, Clone)]
pub struct TocEntry {
    pub dump_id: i64,
    pub desc: Option<String>,
    pub defn: Option<String>,
    pub copy_stmt: Option<String>,
}

impl TocEntry {
    pub fn is_table_data(&self) -> bool {
        self.desc.as_deref() == Some("TABLE DATA")
    }

    pub fn is_comment(&self) -> bool {
        self.desc.as_deref() == Some("COMMENT")
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn parse_toc<R: Read>(r: &mut R, dio: &DumpIo, version: Version) -> Result<Vec<TocEntry>> {
    let count = dio.read_int(r)?;
    let mut entries = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        entries.push(parse_entry(r, dio, version)?);
    }
    Ok(entries)
}

fn parse_entry<R: Read>(r: &mut R, dio: &DumpIo, version: Version) -> Result<TocEntry> {
    let dump_id = dio.read_int(r)?;
    let _had_dumper = dio.read_int(r)?;
    let _table_oid = dio.read_string(r)?;
    let _oid = dio.read_string(r)?;
    let _tag = dio.read_string(r)?;
    let desc = dio.read_string(r)?;

    let _section_idx = dio.read_int(r)?;

    let defn = dio.read_string(r)?;
    let _drop_stmt = dio.read_string(r)?;
    let copy_stmt = dio.read_string(r)?;
    let _namespace = dio.read_string(r)?;
    let _tablespace = dio.read_string(r)?;

    if supports_tableam(version) {
        let _tableam = dio.read_string(r)?;
    }

    let _owner = dio.read_string(r)?;
    let _with_oids = dio.read_string(r)?;

    loop {
        let dep = dio.read_string(r)?;
        if dep.is_empty() {
            break;
        }
    }

    let _data_state = dio.read_byte(r)?;
    let _offset = dio.read_offset(r)?;

    Ok(TocEntry {
        dump_id,
        desc: non_empty(desc),
        defn: non_empty(defn),
        copy_stmt: non_empty(copy_stmt),
    })
}

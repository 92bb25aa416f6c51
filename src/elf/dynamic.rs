//! Dynamic section parsing

use crate::elf::header::FileHeader;
use crate::elf::tables::{walk_table, SectionTable, TableLayout};
use crate::elf::types::*;
use crate::error::{Diagnostics, Stage};
use crate::reader::ByteReader;
use serde::{Deserialize, Serialize};

pub const DT_NULL: i64 = 0;
pub const DT_NEEDED: i64 = 1;
pub const DT_STRTAB: i64 = 5;
pub const DT_SYMTAB: i64 = 6;
pub const DT_SONAME: i64 = 14;
pub const DT_RPATH: i64 = 15;
pub const DT_BIND_NOW: i64 = 24;
pub const DT_RUNPATH: i64 = 29;
pub const DT_FLAGS: i64 = 30;
pub const DT_FLAGS_1: i64 = 0x6ffffffb;

pub const DF_BIND_NOW: u64 = 0x8;
pub const DF_1_NOW: u64 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicEntry {
    pub tag: i64,
    pub value: u64,
}

/// Dynamic-linking facts from the first DYNAMIC section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicInfo {
    pub entries: Vec<DynamicEntry>,
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub rpath: Option<String>,
    pub runpath: Option<String>,
    pub flags: Option<u64>,
    pub flags_1: Option<u64>,
    pub bind_now: bool,
}

impl DynamicInfo {
    pub fn value(&self, tag: i64) -> Option<u64> {
        self.entries.iter().find(|e| e.tag == tag).map(|e| e.value)
    }
}

/// Decode the DYNAMIC section, if there is one.
pub fn parse_dynamic(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    sections: &SectionTable,
    diags: &mut Diagnostics,
) -> Option<DynamicInfo> {
    let section = sections.of_type(SectionType::Dynamic).next()?;
    let class = header.class;
    let min = match class {
        ElfClass::Elf32 => 8,
        ElfClass::Elf64 => 16,
    };
    let entry_size = if section.entsize == 0 { min } else { section.entsize };
    let layout = TableLayout {
        name: ".dynamic",
        offset: section.offset,
        count: if entry_size == 0 { 0 } else { section.size / entry_size },
        entry_size,
        min_entry_size: min,
    };

    let raw = walk_table(reader, layout, Stage::Dynamic, diags, |off, _| {
        let entry = match class {
            ElfClass::Elf32 => DynamicEntry {
                tag: i64::from(reader.read_i32(off)?),
                value: u64::from(reader.read_u32(off + 4)?),
            },
            ElfClass::Elf64 => DynamicEntry {
                tag: reader.read_i64(off)?,
                value: reader.read_u64(off + 8)?,
            },
        };
        Ok(entry)
    });
    let entries: Vec<DynamicEntry> = raw.into_iter().take_while(|e| e.tag != DT_NULL).collect();

    // Strings come from the linked section (normally .dynstr)
    let strtab = sections
        .by_index(section.link as usize)
        .filter(|s| s.has_file_data());
    let string_at = |value: u64| -> Option<String> {
        let st = strtab?;
        reader.read_cstr_in(st.offset, st.size, value).ok()
    };

    let mut info = DynamicInfo::default();
    for entry in &entries {
        match entry.tag {
            DT_NEEDED => info.needed.extend(string_at(entry.value)),
            DT_SONAME if info.soname.is_none() => info.soname = string_at(entry.value),
            DT_RPATH if info.rpath.is_none() => info.rpath = string_at(entry.value),
            DT_RUNPATH if info.runpath.is_none() => info.runpath = string_at(entry.value),
            DT_FLAGS => info.flags = Some(entry.value),
            DT_FLAGS_1 => info.flags_1 = Some(entry.value),
            DT_BIND_NOW => info.bind_now = true,
            _ => {}
        }
    }
    info.bind_now |= info.flags.is_some_and(|f| f & DF_BIND_NOW != 0)
        || info.flags_1.is_some_and(|f| f & DF_1_NOW != 0);
    info.entries = entries;

    tracing::debug!(
        needed = info.needed.len(),
        soname = ?info.soname,
        "parsed dynamic section"
    );
    Some(info)
}

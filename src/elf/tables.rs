//! Program header and section header tables.
//!
//! Both tables are walked entry by entry. An entry that would run past the end
//! of the image stops the walk; the entries decoded so far are kept and a
//! `TruncatedTable` diagnostic records what was dropped.

use crate::elf::header::FileHeader;
use crate::elf::types::*;
use crate::error::{AnalysisError, Diagnostics, Result, Stage};
use crate::reader::{checked_add, entry_offset, ByteReader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed-size table geometry
#[derive(Debug, Clone, Copy)]
pub(crate) struct TableLayout<'a> {
    pub name: &'a str,
    pub offset: u64,
    pub count: u64,
    pub entry_size: u64,
    pub min_entry_size: u64,
}

/// Walk `layout.count` entries, decoding each with `decode(entry_offset, index)`.
///
/// Stops at the first entry that is out of bounds or fails to decode, records
/// a diagnostic, and returns what was read.
pub(crate) fn walk_table<T>(
    reader: &ByteReader<'_>,
    layout: TableLayout<'_>,
    stage: Stage,
    diags: &mut Diagnostics,
    mut decode: impl FnMut(u64, usize) -> Result<T>,
) -> Vec<T> {
    if layout.count == 0 {
        return Vec::new();
    }
    if layout.entry_size < layout.min_entry_size {
        diags.push(
            stage,
            AnalysisError::InvalidEntrySize {
                table: layout.name.to_string(),
                expected: layout.min_entry_size,
                found: layout.entry_size,
            },
        );
        return Vec::new();
    }

    let fits = (reader.len() as u64 / layout.entry_size).min(layout.count);
    let mut out = Vec::with_capacity(fits as usize);
    for index in 0..layout.count {
        let truncated = || AnalysisError::TruncatedTable {
            table: layout.name.to_string(),
            parsed: index as usize,
            declared: usize::try_from(layout.count).unwrap_or(usize::MAX),
        };
        let offset = match entry_offset(layout.offset, index, layout.entry_size) {
            Ok(off) => off,
            Err(err) => {
                diags.push(stage, err);
                diags.push(stage, truncated());
                break;
            }
        };
        if !reader.contains_range(offset, layout.min_entry_size) {
            diags.push(stage, truncated());
            break;
        }
        match decode(offset, index as usize) {
            Ok(entry) => out.push(entry),
            Err(err) => {
                diags.push(stage, err);
                diags.push(stage, truncated());
                break;
            }
        }
    }
    out
}

/// Program header (segment)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramHeaderEntry {
    pub index: usize,
    pub segment_type: SegmentType,
    pub flags: SegmentFlags,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub file_size: u64,
    pub mem_size: u64,
    pub align: u64,
}

impl ProgramHeaderEntry {
    pub fn is_load(&self) -> bool {
        self.segment_type == SegmentType::Load
    }

    pub fn is_executable(&self) -> bool {
        self.flags.contains(SegmentFlags::X)
    }

    pub fn contains_vaddr(&self, addr: u64) -> bool {
        addr >= self.vaddr && addr - self.vaddr < self.mem_size
    }

    /// File offset backing `addr`, if the address is file-backed here.
    pub fn vaddr_to_offset(&self, addr: u64) -> Option<u64> {
        if !self.contains_vaddr(addr) {
            return None;
        }
        let delta = addr - self.vaddr;
        if delta < self.file_size {
            self.offset.checked_add(delta)
        } else {
            None // In memory but not in file
        }
    }
}

/// Section header with its resolved name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionHeaderEntry {
    pub index: usize,
    pub name: String,
    pub name_offset: u32,
    pub section_type: SectionType,
    pub flags: SectionFlags,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl SectionHeaderEntry {
    pub fn is_executable(&self) -> bool {
        self.flags.contains(SectionFlags::EXECINSTR)
    }

    pub fn is_allocated(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC)
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(SectionFlags::WRITE)
    }

    /// NOBITS sections occupy no bytes in the file.
    pub fn has_file_data(&self) -> bool {
        !matches!(self.section_type, SectionType::Nobits | SectionType::Null)
    }

    pub fn contains_addr(&self, addr: u64) -> bool {
        self.is_allocated() && addr >= self.addr && addr - self.addr < self.size
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        self.has_file_data() && offset >= self.offset && offset - self.offset < self.size
    }

    /// Virtual address of a file offset inside this section.
    pub fn offset_to_addr(&self, offset: u64) -> Option<u64> {
        if !self.is_allocated() || !self.contains_offset(offset) {
            return None;
        }
        self.addr.checked_add(offset - self.offset)
    }
}

/// Section list with name and address lookup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionTable {
    sections: Vec<SectionHeaderEntry>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl SectionTable {
    pub fn new(sections: Vec<SectionHeaderEntry>) -> Self {
        let mut by_name = HashMap::new();
        for s in &sections {
            if !s.name.is_empty() {
                by_name.entry(s.name.clone()).or_insert(s.index);
            }
        }
        Self { sections, by_name }
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionHeaderEntry> {
        self.sections.iter()
    }

    pub fn as_slice(&self) -> &[SectionHeaderEntry] {
        &self.sections
    }

    pub fn by_index(&self, index: usize) -> Option<&SectionHeaderEntry> {
        self.sections.get(index)
    }

    /// First section with this name
    pub fn by_name(&self, name: &str) -> Option<&SectionHeaderEntry> {
        self.by_name.get(name).and_then(|&idx| self.by_index(idx))
    }

    /// Allocated section containing a virtual address
    pub fn by_addr(&self, addr: u64) -> Option<&SectionHeaderEntry> {
        self.sections.iter().find(|s| s.contains_addr(addr))
    }

    /// File-backed section containing a file offset
    pub fn by_offset(&self, offset: u64) -> Option<&SectionHeaderEntry> {
        self.sections
            .iter()
            .filter(|s| s.index != 0)
            .find(|s| s.contains_offset(offset))
    }

    pub fn of_type(&self, ty: SectionType) -> impl Iterator<Item = &SectionHeaderEntry> {
        self.sections.iter().filter(move |s| s.section_type == ty)
    }

    pub fn executable(&self) -> impl Iterator<Item = &SectionHeaderEntry> {
        self.sections
            .iter()
            .filter(|s| s.is_executable() && s.has_file_data() && s.size > 0)
    }

    /// Raw bytes of a section. NOBITS sections yield an empty slice.
    pub fn data<'data>(
        &self,
        reader: &ByteReader<'data>,
        section: &SectionHeaderEntry,
    ) -> Result<&'data [u8]> {
        if !section.has_file_data() {
            return Ok(&[]);
        }
        reader.slice(section.offset, section.size)
    }
}

/// Counts after resolving extended numbering through section 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableCounts {
    pub phnum: u64,
    pub shnum: u64,
    pub shstrndx: u64,
}

/// Resolve `e_phnum`, `e_shnum` and `e_shstrndx`, consulting section 0 when
/// the header uses the escape values.
pub fn resolve_counts(reader: &ByteReader<'_>, header: &FileHeader) -> TableCounts {
    let escaped = header.e_shnum == 0 || header.e_shstrndx == SHN_XINDEX || header.e_phnum == PN_XNUM;
    let zero = if escaped && header.e_shoff != 0 {
        decode_raw_section(reader, header.class, header.e_shoff).ok()
    } else {
        None
    };

    let shnum = match (&zero, header.e_shnum) {
        (Some(z), 0) => z.size,
        (_, n) => u64::from(n),
    };
    let shstrndx = match (&zero, header.e_shstrndx) {
        (Some(z), SHN_XINDEX) => u64::from(z.link),
        (_, n) => u64::from(n),
    };
    let phnum = match (&zero, header.e_phnum) {
        (Some(z), PN_XNUM) => u64::from(z.info),
        (_, n) => u64::from(n),
    };
    TableCounts {
        phnum,
        shnum,
        shstrndx,
    }
}

/// Parse the program header table.
pub fn parse_program_headers(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    counts: &TableCounts,
    diags: &mut Diagnostics,
) -> Vec<ProgramHeaderEntry> {
    if header.e_phoff == 0 {
        return Vec::new();
    }
    let class = header.class;
    let layout = TableLayout {
        name: "program headers",
        offset: header.e_phoff,
        count: counts.phnum,
        entry_size: u64::from(header.e_phentsize),
        min_entry_size: class.program_header_size(),
    };
    let entries = walk_table(reader, layout, Stage::ProgramHeaders, diags, |off, index| {
        parse_program_header(reader, class, off, index)
    });
    tracing::debug!(count = entries.len(), "parsed program headers");
    entries
}

fn parse_program_header(
    r: &ByteReader<'_>,
    class: ElfClass,
    off: u64,
    index: usize,
) -> Result<ProgramHeaderEntry> {
    // p_flags moves to the second field on ELF64
    let entry = match class {
        ElfClass::Elf32 => ProgramHeaderEntry {
            index,
            segment_type: SegmentType::from(r.read_u32(off)?),
            offset: u64::from(r.read_u32(off + 4)?),
            vaddr: u64::from(r.read_u32(off + 8)?),
            paddr: u64::from(r.read_u32(off + 12)?),
            file_size: u64::from(r.read_u32(off + 16)?),
            mem_size: u64::from(r.read_u32(off + 20)?),
            flags: SegmentFlags::from_bits_retain(r.read_u32(off + 24)?),
            align: u64::from(r.read_u32(off + 28)?),
        },
        ElfClass::Elf64 => ProgramHeaderEntry {
            index,
            segment_type: SegmentType::from(r.read_u32(off)?),
            flags: SegmentFlags::from_bits_retain(r.read_u32(off + 4)?),
            offset: r.read_u64(off + 8)?,
            vaddr: r.read_u64(off + 16)?,
            paddr: r.read_u64(off + 24)?,
            file_size: r.read_u64(off + 32)?,
            mem_size: r.read_u64(off + 40)?,
            align: r.read_u64(off + 48)?,
        },
    };
    Ok(entry)
}

/// Section header before name resolution
#[derive(Debug, Clone, Copy)]
struct RawSection {
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

fn decode_raw_section(r: &ByteReader<'_>, class: ElfClass, off: u64) -> Result<RawSection> {
    match class {
        ElfClass::Elf32 => Ok(RawSection {
            name: r.read_u32(off)?,
            sh_type: r.read_u32(off + 4)?,
            flags: u64::from(r.read_u32(off + 8)?),
            addr: u64::from(r.read_u32(off + 12)?),
            offset: u64::from(r.read_u32(off + 16)?),
            size: u64::from(r.read_u32(off + 20)?),
            link: r.read_u32(off + 24)?,
            info: r.read_u32(off + 28)?,
            addralign: u64::from(r.read_u32(off + 32)?),
            entsize: u64::from(r.read_u32(off + 36)?),
        }),
        ElfClass::Elf64 => Ok(RawSection {
            name: r.read_u32(off)?,
            sh_type: r.read_u32(off + 4)?,
            flags: r.read_u64(off + 8)?,
            addr: r.read_u64(off + 16)?,
            offset: r.read_u64(off + 24)?,
            size: r.read_u64(off + 32)?,
            link: r.read_u32(off + 40)?,
            info: r.read_u32(off + 44)?,
            addralign: r.read_u64(off + 48)?,
            entsize: r.read_u64(off + 56)?,
        }),
    }
}

/// Parse the section header table and resolve section names.
pub fn parse_section_headers(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    counts: &TableCounts,
    diags: &mut Diagnostics,
) -> SectionTable {
    if header.e_shoff == 0 {
        return SectionTable::default();
    }
    let class = header.class;
    let layout = TableLayout {
        name: "section headers",
        offset: header.e_shoff,
        count: counts.shnum,
        entry_size: u64::from(header.e_shentsize),
        min_entry_size: class.section_header_size(),
    };
    let raw = walk_table(reader, layout, Stage::SectionHeaders, diags, |off, _| {
        decode_raw_section(reader, class, off)
    });

    // Section-name string table; any problem leaves names empty.
    let names = usize::try_from(counts.shstrndx)
        .ok()
        .and_then(|idx| raw.get(idx))
        .filter(|s| s.sh_type != SHT_NOBITS && counts.shstrndx != u64::from(SHN_UNDEF))
        .copied();
    if names.is_none() && !raw.is_empty() {
        tracing::debug!(shstrndx = counts.shstrndx, "no usable section name table");
    }

    let sections: Vec<SectionHeaderEntry> = raw
        .iter()
        .enumerate()
        .map(|(index, s)| {
            let name = names
                .and_then(|strtab| {
                    reader
                        .read_cstr_in(strtab.offset, strtab.size, u64::from(s.name))
                        .ok()
                })
                .unwrap_or_default();
            SectionHeaderEntry {
                index,
                name,
                name_offset: s.name,
                section_type: SectionType::from(s.sh_type),
                flags: SectionFlags::from_bits_retain(s.flags),
                addr: s.addr,
                offset: s.offset,
                size: s.size,
                link: s.link,
                info: s.info,
                addralign: s.addralign,
                entsize: s.entsize,
            }
        })
        .collect();

    for s in &sections {
        if s.section_type.requires_link() && s.link as usize >= sections.len() {
            diags.push(
                Stage::SectionHeaders,
                AnalysisError::InvalidSectionLink {
                    section: s.index,
                    link: s.link,
                },
            );
        }
        if s.has_file_data() && checked_add(s.offset, s.size, "section range").is_err() {
            diags.push(
                Stage::SectionHeaders,
                AnalysisError::IntegerOverflow {
                    context: format!("section {} range", s.index),
                },
            );
        }
    }

    tracing::debug!(count = sections.len(), "parsed section headers");
    SectionTable::new(sections)
}

//! Relocation processing (REL and RELA)

use crate::elf::header::FileHeader;
use crate::elf::symbols::Symbol;
use crate::elf::tables::{walk_table, SectionHeaderEntry, SectionTable, TableLayout};
use crate::elf::types::*;
use crate::error::{Diagnostics, Result, Stage};
use crate::reader::ByteReader;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationEntry {
    pub offset: u64,
    pub info: u64,
    pub reloc_type: u32,
    pub type_name: Option<String>,
    pub symbol_index: u32,
    pub symbol_name: Option<String>,
    /// Present for RELA entries only
    pub addend: Option<i64>,
    pub section_index: usize,
}

/// Unpack `r_info` into (symbol index, type) for the given class.
pub fn decode_info(info: u64, class: ElfClass) -> (u32, u32) {
    match class {
        ElfClass::Elf32 => ((info >> 8) as u32, (info & 0xff) as u32),
        ElfClass::Elf64 => ((info >> 32) as u32, (info & 0xffff_ffff) as u32),
    }
}

/// Entry size of REL/RELA records for a class.
pub fn entry_size(class: ElfClass, is_rela: bool) -> u64 {
    match (class, is_rela) {
        (ElfClass::Elf32, false) => 8,  // Elf32_Rel
        (ElfClass::Elf32, true) => 12,  // Elf32_Rela
        (ElfClass::Elf64, false) => 16, // Elf64_Rel
        (ElfClass::Elf64, true) => 24,  // Elf64_Rela
    }
}

/// Walk every REL and RELA section.
pub fn extract_relocations(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    sections: &SectionTable,
    symbols: &[Symbol],
    diags: &mut Diagnostics,
) -> Vec<RelocationEntry> {
    let names: HashMap<(usize, usize), &str> = symbols
        .iter()
        .filter(|s| !s.name.is_empty())
        .map(|s| ((s.table_section, s.index), s.name.as_str()))
        .collect();

    let mut out = Vec::new();
    for section in sections.iter() {
        let is_rela = match section.section_type {
            SectionType::Rela => true,
            SectionType::Rel => false,
            _ => continue,
        };
        if section.link as usize >= sections.len() {
            continue; // recorded as InvalidSectionLink already
        }
        let before = out.len();
        parse_relocation_section(reader, header, section, is_rela, &names, diags, &mut out);
        tracing::debug!(
            section = %section.name,
            count = out.len() - before,
            "parsed relocations"
        );
    }
    out
}

fn parse_relocation_section(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    section: &SectionHeaderEntry,
    is_rela: bool,
    names: &HashMap<(usize, usize), &str>,
    diags: &mut Diagnostics,
    out: &mut Vec<RelocationEntry>,
) {
    let class = header.class;
    let min = entry_size(class, is_rela);
    let size = if section.entsize == 0 { min } else { section.entsize };
    let table_name = if section.name.is_empty() {
        format!("relocation table {}", section.index)
    } else {
        section.name.clone()
    };
    let layout = TableLayout {
        name: &table_name,
        offset: section.offset,
        count: if size == 0 { 0 } else { section.size / size },
        entry_size: size,
        min_entry_size: min,
    };
    let symtab = section.link as usize;
    let machine = header.e_machine;

    let entries = walk_table(reader, layout, Stage::Relocations, diags, |off, _| {
        let (r_offset, info, addend) = read_raw(reader, class, off, is_rela)?;
        let (symbol_index, reloc_type) = decode_info(info, class);
        let symbol_name = match symbol_index {
            0 => None,
            idx => names.get(&(symtab, idx as usize)).map(|n| n.to_string()),
        };
        Ok(RelocationEntry {
            offset: r_offset,
            info,
            reloc_type,
            type_name: type_name(machine, reloc_type).map(str::to_string),
            symbol_index,
            symbol_name,
            addend,
            section_index: section.index,
        })
    });
    out.extend(entries);
}

fn read_raw(
    r: &ByteReader<'_>,
    class: ElfClass,
    off: u64,
    is_rela: bool,
) -> Result<(u64, u64, Option<i64>)> {
    match class {
        ElfClass::Elf32 => {
            let offset = u64::from(r.read_u32(off)?);
            let info = u64::from(r.read_u32(off + 4)?);
            let addend = if is_rela {
                Some(i64::from(r.read_i32(off + 8)?))
            } else {
                None
            };
            Ok((offset, info, addend))
        }
        ElfClass::Elf64 => {
            let offset = r.read_u64(off)?;
            let info = r.read_u64(off + 8)?;
            let addend = if is_rela {
                Some(r.read_i64(off + 16)?)
            } else {
                None
            };
            Ok((offset, info, addend))
        }
    }
}

/// Name of a relocation type for the common machines.
pub fn type_name(machine: u16, reloc_type: u32) -> Option<&'static str> {
    let name = match (machine, reloc_type) {
        (EM_X86_64, 0) => "R_X86_64_NONE",
        (EM_X86_64, 1) => "R_X86_64_64",
        (EM_X86_64, 2) => "R_X86_64_PC32",
        (EM_X86_64, 3) => "R_X86_64_GOT32",
        (EM_X86_64, 4) => "R_X86_64_PLT32",
        (EM_X86_64, 5) => "R_X86_64_COPY",
        (EM_X86_64, 6) => "R_X86_64_GLOB_DAT",
        (EM_X86_64, 7) => "R_X86_64_JUMP_SLOT",
        (EM_X86_64, 8) => "R_X86_64_RELATIVE",
        (EM_X86_64, 9) => "R_X86_64_GOTPCREL",
        (EM_X86_64, 10) => "R_X86_64_32",
        (EM_X86_64, 11) => "R_X86_64_32S",
        (EM_X86_64, 16) => "R_X86_64_DTPMOD64",
        (EM_X86_64, 17) => "R_X86_64_DTPOFF64",
        (EM_X86_64, 18) => "R_X86_64_TPOFF64",
        (EM_X86_64, 37) => "R_X86_64_IRELATIVE",
        (EM_X86_64, 41) => "R_X86_64_GOTPCRELX",
        (EM_X86_64, 42) => "R_X86_64_REX_GOTPCRELX",

        (EM_386, 0) => "R_386_NONE",
        (EM_386, 1) => "R_386_32",
        (EM_386, 2) => "R_386_PC32",
        (EM_386, 3) => "R_386_GOT32",
        (EM_386, 4) => "R_386_PLT32",
        (EM_386, 5) => "R_386_COPY",
        (EM_386, 6) => "R_386_GLOB_DAT",
        (EM_386, 7) => "R_386_JMP_SLOT",
        (EM_386, 8) => "R_386_RELATIVE",
        (EM_386, 9) => "R_386_GOTOFF",
        (EM_386, 10) => "R_386_GOTPC",
        (EM_386, 42) => "R_386_IRELATIVE",

        (EM_ARM, 0) => "R_ARM_NONE",
        (EM_ARM, 2) => "R_ARM_ABS32",
        (EM_ARM, 3) => "R_ARM_REL32",
        (EM_ARM, 20) => "R_ARM_COPY",
        (EM_ARM, 21) => "R_ARM_GLOB_DAT",
        (EM_ARM, 22) => "R_ARM_JUMP_SLOT",
        (EM_ARM, 23) => "R_ARM_RELATIVE",
        (EM_ARM, 28) => "R_ARM_CALL",
        (EM_ARM, 29) => "R_ARM_JUMP24",
        (EM_ARM, 30) => "R_ARM_THM_JUMP24",
        (EM_ARM, 160) => "R_ARM_IRELATIVE",

        (EM_AARCH64, 0) => "R_AARCH64_NONE",
        (EM_AARCH64, 257) => "R_AARCH64_ABS64",
        (EM_AARCH64, 258) => "R_AARCH64_ABS32",
        (EM_AARCH64, 261) => "R_AARCH64_PREL32",
        (EM_AARCH64, 275) => "R_AARCH64_ADR_PREL_PG_HI21",
        (EM_AARCH64, 277) => "R_AARCH64_ADD_ABS_LO12_NC",
        (EM_AARCH64, 282) => "R_AARCH64_JUMP26",
        (EM_AARCH64, 283) => "R_AARCH64_CALL26",
        (EM_AARCH64, 1024) => "R_AARCH64_COPY",
        (EM_AARCH64, 1025) => "R_AARCH64_GLOB_DAT",
        (EM_AARCH64, 1026) => "R_AARCH64_JUMP_SLOT",
        (EM_AARCH64, 1027) => "R_AARCH64_RELATIVE",
        (EM_AARCH64, 1032) => "R_AARCH64_IRELATIVE",
        _ => return None,
    };
    Some(name)
}

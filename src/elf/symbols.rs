//! Symbol table extraction (SYMTAB and DYNSYM)

use crate::demangle::demangle_name;
use crate::elf::header::FileHeader;
use crate::elf::tables::{walk_table, SectionHeaderEntry, SectionTable, TableLayout};
use crate::elf::types::*;
use crate::error::{Diagnostics, Result, Stage};
use crate::reader::{entry_offset, ByteReader};
use serde::{Deserialize, Serialize};

/// Which table a symbol came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolTableKind {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub demangled: Option<String>,
    pub value: u64,
    pub size: u64,
    pub symbol_type: SymbolType,
    pub binding: SymbolBinding,
    pub visibility: SymbolVisibility,
    /// Owning section index, with `SHN_XINDEX` already resolved
    pub section_index: u32,
    pub table: SymbolTableKind,
    /// Index within its symbol table
    pub index: usize,
    /// Index of the symbol table section
    pub table_section: usize,
}

impl Symbol {
    pub fn is_defined(&self) -> bool {
        self.section_index != u32::from(SHN_UNDEF)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.symbol_type, SymbolType::Func | SymbolType::GnuIfunc)
    }

    pub fn is_global(&self) -> bool {
        matches!(
            self.binding,
            SymbolBinding::Global | SymbolBinding::Weak | SymbolBinding::GnuUnique
        )
    }

    pub fn is_import(&self) -> bool {
        !self.is_defined() && self.is_global() && !self.name.is_empty()
    }

    pub fn is_export(&self) -> bool {
        self.is_defined()
            && self.is_global()
            && !self.name.is_empty()
            && matches!(
                self.visibility,
                SymbolVisibility::Default | SymbolVisibility::Protected
            )
    }

    /// Demangled name when there is one, raw name otherwise.
    pub fn display_name(&self) -> &str {
        self.demangled.as_deref().unwrap_or(&self.name)
    }
}

/// Split `st_info` into type (low nibble) and binding (high nibble).
pub fn decode_info(info: u8) -> (SymbolType, SymbolBinding) {
    (SymbolType::from(info & 0xf), SymbolBinding::from(info >> 4))
}

/// Walk every SYMTAB and DYNSYM section.
///
/// Sections with a bad `sh_link` are skipped; the section header pass has
/// already recorded that. A table that runs past the image keeps its whole
/// entries and records `TruncatedTable`.
pub fn extract_symbols(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    sections: &SectionTable,
    demangle: bool,
    diags: &mut Diagnostics,
) -> Vec<Symbol> {
    let mut out = Vec::new();
    for section in sections.iter() {
        let kind = match section.section_type {
            SectionType::Symtab => SymbolTableKind::Static,
            SectionType::Dynsym => SymbolTableKind::Dynamic,
            _ => continue,
        };
        let Some(strtab) = sections.by_index(section.link as usize) else {
            continue;
        };
        let before = out.len();
        parse_symbol_table(
            reader, header, sections, section, strtab, kind, demangle, diags, &mut out,
        );
        tracing::debug!(
            section = %section.name,
            count = out.len() - before,
            "parsed symbol table"
        );
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn parse_symbol_table(
    reader: &ByteReader<'_>,
    header: &FileHeader,
    sections: &SectionTable,
    symtab: &SectionHeaderEntry,
    strtab: &SectionHeaderEntry,
    kind: SymbolTableKind,
    demangle: bool,
    diags: &mut Diagnostics,
    out: &mut Vec<Symbol>,
) {
    let class = header.class;
    let min = class.symbol_size();
    let entry_size = if symtab.entsize == 0 { min } else { symtab.entsize };
    let table_name = if symtab.name.is_empty() {
        format!("symbol table {}", symtab.index)
    } else {
        symtab.name.clone()
    };
    let layout = TableLayout {
        name: &table_name,
        offset: symtab.offset,
        count: if entry_size == 0 { 0 } else { symtab.size / entry_size },
        entry_size,
        min_entry_size: min,
    };

    // Extended section indices for this table, if present
    let shndx = sections
        .of_type(SectionType::SymtabShndx)
        .find(|s| s.link as usize == symtab.index);

    let strings = strtab.has_file_data().then_some(strtab);
    let symbols = walk_table(reader, layout, Stage::Symbols, diags, |off, index| {
        let raw = read_raw_symbol(reader, class, off)?;
        let name = match strings {
            Some(st) if raw.name != 0 => reader
                .read_cstr_in(st.offset, st.size, u64::from(raw.name))
                .unwrap_or_default(),
            _ => String::new(),
        };
        let section_index = match (raw.shndx, shndx) {
            (SHN_XINDEX, Some(x)) => {
                let at = entry_offset(x.offset, index as u64, 4)?;
                reader.read_u32(at).unwrap_or(u32::from(SHN_XINDEX))
            }
            (n, _) => u32::from(n),
        };
        let (symbol_type, binding) = decode_info(raw.info);
        let demangled = if demangle && !name.is_empty() {
            demangle_name(&name)
        } else {
            None
        };
        Ok(Symbol {
            name,
            demangled,
            value: raw.value,
            size: raw.size,
            symbol_type,
            binding,
            visibility: SymbolVisibility::from(raw.other),
            section_index,
            table: kind,
            index,
            table_section: symtab.index,
        })
    });

    // Entry 0 is the reserved null symbol
    out.extend(symbols.into_iter().filter(|s| s.index != 0));
}

struct RawSymbol {
    name: u32,
    value: u64,
    size: u64,
    info: u8,
    other: u8,
    shndx: u16,
}

fn read_raw_symbol(r: &ByteReader<'_>, class: ElfClass, off: u64) -> Result<RawSymbol> {
    match class {
        ElfClass::Elf32 => Ok(RawSymbol {
            name: r.read_u32(off)?,
            value: u64::from(r.read_u32(off + 4)?),
            size: u64::from(r.read_u32(off + 8)?),
            info: r.read_u8(off + 12)?,
            other: r.read_u8(off + 13)?,
            shndx: r.read_u16(off + 14)?,
        }),
        ElfClass::Elf64 => Ok(RawSymbol {
            name: r.read_u32(off)?,
            info: r.read_u8(off + 4)?,
            other: r.read_u8(off + 5)?,
            shndx: r.read_u16(off + 6)?,
            value: r.read_u64(off + 8)?,
            size: r.read_u64(off + 16)?,
        }),
    }
}

/// Undefined global or weak symbols
pub fn imports(symbols: &[Symbol]) -> impl Iterator<Item = &Symbol> {
    symbols.iter().filter(|s| s.is_import())
}

/// Defined global or weak symbols with default or protected visibility
pub fn exports(symbols: &[Symbol]) -> impl Iterator<Item = &Symbol> {
    symbols.iter().filter(|s| s.is_export())
}

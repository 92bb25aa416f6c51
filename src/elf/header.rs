//! ELF header parsing

use crate::elf::types::*;
use crate::error::{AnalysisError, Result};
use crate::reader::{ByteReader, Endian};
use serde::{Deserialize, Serialize};

/// Decoded file header. Word size and byte order are decided here and nowhere
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub class: ElfClass,
    pub endian: Endian,
    pub ident_version: u8,
    pub os_abi: u8,
    pub abi_version: u8,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_shoff: u64,
    pub e_flags: u32,
    pub e_ehsize: u16,
    pub e_phentsize: u16,
    pub e_phnum: u16,
    pub e_shentsize: u16,
    pub e_shnum: u16,
    pub e_shstrndx: u16,
}

impl FileHeader {
    pub fn file_type(&self) -> ElfType {
        ElfType::from(self.e_type)
    }

    pub fn machine(&self) -> ElfMachine {
        ElfMachine::from(self.e_machine)
    }

    pub fn entry_point(&self) -> u64 {
        self.e_entry
    }

    pub fn os_abi_name(&self) -> &'static str {
        os_abi_name(self.os_abi)
    }

    pub fn is_pie(&self) -> bool {
        self.file_type() == ElfType::SharedObject
    }

    /// Reader over `data` using this header's byte order.
    pub fn reader<'data>(&self, data: &'data [u8]) -> ByteReader<'data> {
        ByteReader::new(data, self.endian)
    }
}

/// Parse the file header at the start of `data`.
pub fn parse_header(data: &[u8]) -> Result<FileHeader> {
    // Identification bytes are single octets; byte order does not matter yet.
    let ident = ByteReader::new(data, Endian::Little);
    match ident.slice(0, ELF_MAGIC.len() as u64) {
        Ok(magic) if magic == &ELF_MAGIC[..] => {}
        _ => return Err(AnalysisError::NotAnElfFile),
    }
    if data.len() < EI_NIDENT {
        return Err(AnalysisError::TruncatedHeader {
            needed: EI_NIDENT,
            available: data.len(),
        });
    }

    let class = match ident.read_u8(4)? {
        1 => ElfClass::Elf32,
        2 => ElfClass::Elf64,
        value => {
            return Err(AnalysisError::UnsupportedElfVariant {
                field: "class".to_string(),
                value,
            })
        }
    };
    let endian = match ident.read_u8(5)? {
        1 => Endian::Little,
        2 => Endian::Big,
        value => {
            return Err(AnalysisError::UnsupportedElfVariant {
                field: "data encoding".to_string(),
                value,
            })
        }
    };

    let header_size = class.header_size();
    if data.len() < header_size {
        return Err(AnalysisError::TruncatedHeader {
            needed: header_size,
            available: data.len(),
        });
    }

    let r = ident.with_endian(endian);
    let ident_version = r.read_u8(6)?;
    let os_abi = r.read_u8(7)?;
    let abi_version = r.read_u8(8)?;
    let e_type = r.read_u16(16)?;
    let e_machine = r.read_u16(18)?;
    let e_version = r.read_u32(20)?;

    // Fields after e_version shift by the word size.
    let (e_entry, e_phoff, e_shoff, tail) = match class {
        ElfClass::Elf32 => (
            u64::from(r.read_u32(24)?),
            u64::from(r.read_u32(28)?),
            u64::from(r.read_u32(32)?),
            36,
        ),
        ElfClass::Elf64 => (r.read_u64(24)?, r.read_u64(32)?, r.read_u64(40)?, 48),
    };

    let header = FileHeader {
        class,
        endian,
        ident_version,
        os_abi,
        abi_version,
        e_type,
        e_machine,
        e_version,
        e_entry,
        e_phoff,
        e_shoff,
        e_flags: r.read_u32(tail)?,
        e_ehsize: r.read_u16(tail + 4)?,
        e_phentsize: r.read_u16(tail + 6)?,
        e_phnum: r.read_u16(tail + 8)?,
        e_shentsize: r.read_u16(tail + 10)?,
        e_shnum: r.read_u16(tail + 12)?,
        e_shstrndx: r.read_u16(tail + 14)?,
    };

    tracing::debug!(
        class = class.bits(),
        endian = ?endian,
        machine = %header.machine(),
        entry = header.e_entry,
        phnum = header.e_phnum,
        shnum = header.e_shnum,
        "parsed ELF header"
    );

    Ok(header)
}

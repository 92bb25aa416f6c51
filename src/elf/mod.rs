//! ELF structural parsing.
//!
//! Everything here reads through [`crate::reader::ByteReader`] and never
//! indexes the image directly. The header decides word size and byte order;
//! the table parsers take those from [`FileHeader`].

pub mod dynamic;
pub mod header;
pub mod relocations;
pub mod symbols;
pub mod tables;
pub mod types;

pub use dynamic::{DynamicEntry, DynamicInfo};
pub use header::{parse_header, FileHeader};
pub use relocations::RelocationEntry;
pub use symbols::{Symbol, SymbolTableKind};
pub use tables::{ProgramHeaderEntry, SectionHeaderEntry, SectionTable, TableCounts};
pub use types::{
    ElfClass, ElfMachine, ElfType, SectionFlags, SectionType, SegmentFlags, SegmentType,
    SymbolBinding, SymbolType, SymbolVisibility,
};

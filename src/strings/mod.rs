//! String extraction over the image or one section.
//!
//! Scanning is in [`scan`]; this module attributes each hit to the section
//! whose file range contains it and, for allocated sections, gives it a
//! virtual address.

pub mod scan;

use crate::cancel::CancellationToken;
use crate::elf::tables::{SectionHeaderEntry, SectionTable};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use scan::{scan_unique, TerminatedRuns};

/// Cancellation is polled per string and at least once per this many bytes.
const CANCEL_POLL_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedString {
    pub content: String,
    /// File offset of the first byte
    pub offset: u64,
    pub section: Option<String>,
    /// Virtual address when the owning section is allocated
    pub address: Option<u64>,
}

/// File-backed section ranges sorted by start, for offset attribution.
struct SectionIndex<'s> {
    ranges: Vec<(u64, u64, &'s SectionHeaderEntry)>,
}

impl<'s> SectionIndex<'s> {
    fn new(sections: &'s SectionTable) -> Self {
        let mut ranges: Vec<_> = sections
            .iter()
            .filter(|s| s.index != 0 && s.has_file_data() && s.size > 0)
            .filter_map(|s| s.offset.checked_add(s.size).map(|end| (s.offset, end, s)))
            .collect();
        ranges.sort_by_key(|&(start, end, _)| (start, end));
        Self { ranges }
    }

    fn lookup(&self, offset: u64) -> Option<&'s SectionHeaderEntry> {
        let upto = self.ranges.partition_point(|&(start, _, _)| start <= offset);
        self.ranges[..upto]
            .iter()
            .rev()
            .find(|&&(_, end, _)| offset < end)
            .map(|&(_, _, s)| s)
    }
}

/// Scan `data` (which starts at file offset `base`) and attribute the hits.
pub fn extract_strings(
    data: &[u8],
    base: u64,
    min_length: usize,
    max_results: Option<usize>,
    sections: &SectionTable,
    cancel: &CancellationToken,
) -> Result<Vec<ExtractedString>> {
    let index = SectionIndex::new(sections);
    let mut seen: HashSet<&[u8]> = HashSet::new();
    let mut out = Vec::new();
    let mut runs = TerminatedRuns::new(data, min_length);

    loop {
        cancel.check()?;
        let limit = runs.position().saturating_add(CANCEL_POLL_BYTES);
        let Some((rel, bytes)) = runs.next_before(limit) else {
            if runs.is_done() {
                break;
            }
            continue;
        };
        if max_results.is_some_and(|cap| out.len() >= cap) {
            tracing::debug!(cap = ?max_results, "string result cap reached");
            break;
        }
        if !seen.insert(bytes) {
            continue;
        }
        // Printable ASCII is always valid UTF-8
        let content = String::from_utf8_lossy(bytes).into_owned();
        let offset = base + rel as u64;
        let owner = index.lookup(offset);
        out.push(ExtractedString {
            content,
            offset,
            section: owner.map(|s| s.name.clone()),
            address: owner.and_then(|s| s.offset_to_addr(offset)),
        });
    }
    cancel.check()?;
    Ok(out)
}

/// Strings inside one section; NOBITS sections have none.
pub fn extract_section_strings(
    image: &[u8],
    section: &SectionHeaderEntry,
    min_length: usize,
    max_results: Option<usize>,
    sections: &SectionTable,
    cancel: &CancellationToken,
) -> Result<Vec<ExtractedString>> {
    if !section.has_file_data() {
        return Ok(Vec::new());
    }
    let reader = crate::reader::ByteReader::new(image, crate::reader::Endian::Little);
    let data = reader.slice(section.offset, section.size)?;
    extract_strings(data, section.offset, min_length, max_results, sections, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::types::{SectionFlags, SectionType};

    fn section(index: usize, name: &str, offset: u64, size: u64, addr: u64, alloc: bool) -> SectionHeaderEntry {
        SectionHeaderEntry {
            index,
            name: name.to_string(),
            name_offset: 0,
            section_type: SectionType::Progbits,
            flags: if alloc { SectionFlags::ALLOC } else { SectionFlags::empty() },
            addr,
            offset,
            size,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        }
    }

    fn table() -> SectionTable {
        SectionTable::new(vec![
            section(0, "", 0, 0, 0, false),
            section(1, ".rodata", 8, 16, 0x2000, true),
            section(2, ".comment", 24, 16, 0, false),
        ])
    }

    #[test]
    fn attributes_sections_and_addresses() {
        let mut image = vec![0u8; 40];
        image[0..5].copy_from_slice(b"head\0");
        image[10..21].copy_from_slice(b"license_ok\0");
        image[24..32].copy_from_slice(b"GCC: 13\0");

        let out = extract_strings(&image, 0, 4, None, &table(), &CancellationToken::new()).unwrap();
        assert_eq!(out.len(), 3);

        assert_eq!(out[0].content, "head");
        assert_eq!(out[0].section, None);
        assert_eq!(out[0].address, None);

        assert_eq!(out[1].content, "license_ok");
        assert_eq!(out[1].offset, 10);
        assert_eq!(out[1].section.as_deref(), Some(".rodata"));
        assert_eq!(out[1].address, Some(0x2002));

        assert_eq!(out[2].section.as_deref(), Some(".comment"));
        assert_eq!(out[2].address, None);
    }

    #[test]
    fn section_scope_uses_file_offsets() {
        let mut image = vec![0u8; 40];
        image[0..5].copy_from_slice(b"head\0");
        image[10..21].copy_from_slice(b"license_ok\0");
        let sections = table();
        let rodata = sections.by_name(".rodata").unwrap();
        let out = extract_section_strings(&image, rodata, 4, None, &sections, &CancellationToken::new())
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].offset, 10);
    }

    #[test]
    fn cancelled_scan_fails() {
        let token = CancellationToken::new();
        token.cancel();
        let err = extract_strings(b"abcd\0", 0, 4, None, &table(), &token).unwrap_err();
        assert_eq!(err, crate::error::AnalysisError::Cancelled);
    }
}

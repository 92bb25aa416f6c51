//! Case-insensitive substring search over symbols, strings and instructions.

use crate::disasm::Instruction;
use crate::elf::symbols::Symbol;
use crate::strings::ExtractedString;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchFilter {
    /// Instruction mnemonics
    Instructions,
    /// Instruction operand text
    Operands,
    Strings,
    Symbols,
    All,
}

impl SearchFilter {
    fn wants(&self, category: MatchCategory) -> bool {
        match self {
            SearchFilter::All => true,
            SearchFilter::Instructions => category == MatchCategory::Instruction,
            SearchFilter::Operands => category == MatchCategory::Operand,
            SearchFilter::Strings => category == MatchCategory::String,
            SearchFilter::Symbols => category == MatchCategory::Symbol,
        }
    }

    pub fn wants_code(&self) -> bool {
        self.wants(MatchCategory::Instruction) || self.wants(MatchCategory::Operand)
    }
}

/// Result category; the declaration order is the result order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MatchCategory {
    Symbol,
    String,
    Instruction,
    Operand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub category: MatchCategory,
    pub address: Option<u64>,
    /// File offset, for strings outside allocated sections
    pub offset: Option<u64>,
    /// The text that matched
    pub text: String,
    /// Surrounding context, e.g. the whole instruction
    pub context: String,
}

/// A trimmed, lowercased query. Empty queries have no needle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Needle(String);

impl Needle {
    pub fn new(query: &str) -> Option<Self> {
        let q = query.trim();
        (!q.is_empty()).then(|| Needle(q.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn contains(haystack: &str, needle: &Needle) -> bool {
    haystack.to_lowercase().contains(needle.as_str())
}

pub fn search_symbols(symbols: &[Symbol], needle: &Needle) -> Vec<SearchMatch> {
    symbols
        .iter()
        .filter(|s| !s.name.is_empty())
        .filter(|s| {
            contains(&s.name, needle) || s.demangled.as_deref().is_some_and(|d| contains(d, needle))
        })
        .map(|s| SearchMatch {
            category: MatchCategory::Symbol,
            address: Some(s.value),
            offset: None,
            text: s.name.clone(),
            context: s.display_name().to_string(),
        })
        .collect()
}

pub fn search_strings(strings: &[ExtractedString], needle: &Needle) -> Vec<SearchMatch> {
    strings
        .iter()
        .filter(|s| contains(&s.content, needle))
        .map(|s| SearchMatch {
            category: MatchCategory::String,
            address: s.address,
            offset: Some(s.offset),
            text: s.content.clone(),
            context: s.section.clone().unwrap_or_default(),
        })
        .collect()
}

/// Match one instruction's mnemonic and operand text.
pub fn match_instruction(ins: &Instruction, needle: &Needle, filter: SearchFilter, out: &mut Vec<SearchMatch>) {
    if ins.is_bad() {
        return;
    }
    if filter.wants(MatchCategory::Instruction) && contains(&ins.mnemonic, needle) {
        out.push(SearchMatch {
            category: MatchCategory::Instruction,
            address: Some(ins.address),
            offset: None,
            text: ins.mnemonic.clone(),
            context: ins.text(),
        });
    }
    if filter.wants(MatchCategory::Operand) && contains(&ins.op_str, needle) {
        out.push(SearchMatch {
            category: MatchCategory::Operand,
            address: Some(ins.address),
            offset: None,
            text: ins.op_str.clone(),
            context: ins.text(),
        });
    }
}

/// Symbol and string matches for `filter`; code is handled by the caller.
pub fn search_tables(
    symbols: &[Symbol],
    strings: &[ExtractedString],
    needle: &Needle,
    filter: SearchFilter,
) -> Vec<SearchMatch> {
    let mut out = Vec::new();
    if filter.wants(MatchCategory::Symbol) {
        out.extend(search_symbols(symbols, needle));
    }
    if filter.wants(MatchCategory::String) {
        out.extend(search_strings(strings, needle));
    }
    out
}

/// Category first, then address (then file offset).
pub fn sort_matches(matches: &mut [SearchMatch]) {
    matches.sort_by_key(|m| (m.category, m.address, m.offset));
}

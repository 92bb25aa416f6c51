//! Cross-reference index.
//!
//! Built in one pass over symbols, strings and a stream of instructions.
//! References live in one arena; `by_target` and `by_source` map addresses to
//! arena positions, so lookups in either direction never rescan instructions.

use crate::disasm::{Flow, Instruction, Operand};
use crate::elf::symbols::Symbol;
use crate::elf::types::SymbolType;
use crate::error::{AnalysisError, Diagnostic, Stage};
use crate::strings::ExtractedString;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

static RE_HEX_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)0x[0-9a-f]+").expect("valid hex literal regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum XrefKind {
    /// A function symbol is defined here
    SymbolDefinition,
    /// An extracted string lives here
    StringLocation,
    Call,
    Jump,
    /// Instruction operand refers to a string
    StringPointer,
    /// Non-branch operand refers to a function
    SymbolAddress,
    /// Operand refers to a data symbol
    Data,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    /// Instruction address; `None` for symbol and string annotations
    pub from: Option<u64>,
    pub to: u64,
    pub kind: XrefKind,
    pub label: String,
}

#[derive(Debug, Default, Serialize)]
pub struct XrefIndex {
    refs: Vec<CrossReference>,
    #[serde(skip)]
    by_target: HashMap<u64, Vec<usize>>,
    #[serde(skip)]
    by_source: HashMap<u64, Vec<usize>>,
    #[serde(skip)]
    names: HashMap<String, u64>,
    diagnostics: Vec<Diagnostic>,
    instructions_scanned: usize,
}

impl XrefIndex {
    /// Everything that points at `addr`.
    pub fn find_references(&self, addr: u64) -> Vec<&CrossReference> {
        self.lookup(&self.by_target, addr)
    }

    /// Everything the instruction at `addr` points to.
    pub fn references_from(&self, addr: u64) -> Vec<&CrossReference> {
        self.lookup(&self.by_source, addr)
    }

    /// Address of a symbol by raw or demangled name.
    pub fn jump_to(&self, name: &str) -> Option<u64> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrossReference> {
        self.refs.iter()
    }

    /// Problems met while disassembling for the index.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn instructions_scanned(&self) -> usize {
        self.instructions_scanned
    }

    fn lookup(&self, map: &HashMap<u64, Vec<usize>>, addr: u64) -> Vec<&CrossReference> {
        map.get(&addr)
            .map(|ids| ids.iter().filter_map(|&i| self.refs.get(i)).collect())
            .unwrap_or_default()
    }
}

struct KnownSymbol {
    label: String,
    is_function: bool,
}

/// Accumulates references, then freezes into an [`XrefIndex`].
pub struct XrefBuilder {
    index: XrefIndex,
    symbols: HashMap<u64, KnownSymbol>,
    strings: HashMap<u64, String>,
}

impl XrefBuilder {
    /// Seed with symbol and string annotations.
    pub fn new(symbols: &[Symbol], strings: &[ExtractedString]) -> Self {
        let mut builder = Self {
            index: XrefIndex::default(),
            symbols: HashMap::new(),
            strings: HashMap::new(),
        };

        for sym in symbols.iter().filter(|s| s.is_defined() && !s.name.is_empty()) {
            let is_function = sym.is_function();
            if !is_function && sym.symbol_type != SymbolType::Object {
                continue;
            }
            builder.index.names.entry(sym.name.clone()).or_insert(sym.value);
            if let Some(d) = &sym.demangled {
                builder.index.names.entry(d.clone()).or_insert(sym.value);
            }
            // First symbol at an address names it; functions win over objects
            let known = builder.symbols.entry(sym.value).or_insert_with(|| KnownSymbol {
                label: sym.display_name().to_string(),
                is_function,
            });
            if is_function && !known.is_function {
                known.label = sym.display_name().to_string();
                known.is_function = true;
            }
            if is_function {
                builder.push(CrossReference {
                    from: None,
                    to: sym.value,
                    kind: XrefKind::SymbolDefinition,
                    label: sym.display_name().to_string(),
                });
            }
        }

        for s in strings {
            if let Some(addr) = s.address {
                builder.strings.entry(addr).or_insert_with(|| s.content.clone());
                builder.push(CrossReference {
                    from: None,
                    to: addr,
                    kind: XrefKind::StringLocation,
                    label: s.content.clone(),
                });
            }
        }
        builder
    }

    fn push(&mut self, r: CrossReference) {
        let id = self.index.refs.len();
        self.index.by_target.entry(r.to).or_default().push(id);
        if let Some(from) = r.from {
            self.index.by_source.entry(from).or_default().push(id);
        }
        self.index.refs.push(r);
    }

    /// Record any operand of `ins` that names a known symbol or string.
    pub fn add_instruction(&mut self, ins: &Instruction) {
        self.index.instructions_scanned += 1;
        if ins.is_bad() || (self.symbols.is_empty() && self.strings.is_empty()) {
            return;
        }
        let flow = ins.flow();
        let mut emitted: HashSet<(u64, XrefKind)> = HashSet::new();
        for op in &ins.operands {
            for value in operand_values(op) {
                if let Some(sym) = self.symbols.get(&value) {
                    let kind = match flow {
                        Flow::Call => XrefKind::Call,
                        Flow::Jump => XrefKind::Jump,
                        Flow::Other if sym.is_function => XrefKind::SymbolAddress,
                        Flow::Other => XrefKind::Data,
                    };
                    if emitted.insert((value, kind)) {
                        let label = sym.label.clone();
                        self.push(CrossReference {
                            from: Some(ins.address),
                            to: value,
                            kind,
                            label,
                        });
                    }
                }
                if let Some(text) = self.strings.get(&value) {
                    if emitted.insert((value, XrefKind::StringPointer)) {
                        let label = text.clone();
                        self.push(CrossReference {
                            from: Some(ins.address),
                            to: value,
                            kind: XrefKind::StringPointer,
                            label,
                        });
                    }
                }
            }
        }
    }

    pub fn add_diagnostic(&mut self, stage: Stage, error: AnalysisError) {
        tracing::warn!(stage = %stage, error = %error, "cross-reference pass degraded");
        self.index.diagnostics.push(Diagnostic { stage, error });
    }

    pub fn finish(self) -> XrefIndex {
        tracing::debug!(
            refs = self.index.refs.len(),
            instructions = self.index.instructions_scanned,
            "built cross-reference index"
        );
        self.index
    }
}

/// Candidate addresses an operand may refer to: resolved target, immediate,
/// and hex literals in its text.
fn operand_values(op: &Operand) -> Vec<u64> {
    let mut out: Vec<u64> = Vec::with_capacity(2);
    let mut add = |v: u64| {
        if !out.contains(&v) {
            out.push(v);
        }
    };
    if let Some(t) = op.target {
        add(t);
    }
    if let Some(imm) = op.immediate {
        add(imm as u64);
    }
    for m in RE_HEX_LITERAL.find_iter(&op.text) {
        if let Ok(v) = u64::from_str_radix(&m.as_str()[2..], 16) {
            add(v);
        }
    }
    out
}

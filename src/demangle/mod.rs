//! Demangler helpers for Rust and C++ (Itanium) symbol names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_ITANIUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_{1,2}Z[a-zA-Z0-9_.$]+$").expect("valid itanium mangled regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolFlavor {
    Rust,
    Itanium,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemangleResult {
    pub original: String,
    pub demangled: String,
    pub flavor: SymbolFlavor,
}

/// Strip an ELF symbol-version suffix such as `@GLIBC_2.2.5` or `@@VER`.
fn strip_version(s: &str) -> &str {
    match s.find('@') {
        Some(pos) if pos > 0 => &s[..pos],
        _ => s,
    }
}

pub fn detect_flavor(s: &str) -> SymbolFlavor {
    let s = strip_version(s);
    if rustc_demangle::try_demangle(s).is_ok() {
        return SymbolFlavor::Rust;
    }
    if RE_ITANIUM.is_match(s) {
        return SymbolFlavor::Itanium;
    }
    SymbolFlavor::Unknown
}

/// Attempt to demangle a single symbol. Returns None when not recognized.
pub fn demangle_one(s: &str) -> Option<DemangleResult> {
    let name = strip_version(s);
    // Rust (v0 + legacy) demangler; alternate form drops the hash suffix
    if let Ok(dm) = rustc_demangle::try_demangle(name) {
        return Some(DemangleResult {
            original: s.to_string(),
            demangled: format!("{:#}", dm),
            flavor: SymbolFlavor::Rust,
        });
    }
    if RE_ITANIUM.is_match(name) {
        // Some names parse but fail to print (dangling template params)
        let sym = cpp_demangle::Symbol::new(name).ok()?;
        let demangled = sym.demangle(&cpp_demangle::DemangleOptions::default()).ok()?;
        return Some(DemangleResult {
            original: s.to_string(),
            demangled,
            flavor: SymbolFlavor::Itanium,
        });
    }
    None
}

/// Demangled form only, for attaching to symbols.
pub fn demangle_name(s: &str) -> Option<String> {
    demangle_one(s).map(|r| r.demangled)
}

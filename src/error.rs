//! Error types for the elfscope analysis engine.
//!
//! Fatal errors (a bad header, a cancelled run) are returned directly from the
//! facade. Recoverable problems found while walking tables are wrapped in a
//! [`Diagnostic`] and attached to the finished analysis instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type for elfscope operations.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AnalysisError {
    /// Magic bytes are not `7F 45 4C 46`
    #[error("Not an ELF file")]
    NotAnElfFile,

    /// Class or data-encoding byte outside the supported values
    #[error("Unsupported ELF variant: {field} = {value}")]
    UnsupportedElfVariant { field: String, value: u8 },

    /// Buffer shorter than the fixed header for its class
    #[error("Truncated header: need {needed} bytes, have {available}")]
    TruncatedHeader { needed: usize, available: usize },

    /// A read past the end of the image
    #[error("Read out of bounds at offset {offset:#x} (width {width}, length {length})")]
    OutOfBounds {
        offset: u64,
        width: u64,
        length: usize,
    },

    /// Offset or size arithmetic that does not fit the address width
    #[error("Integer overflow computing {context}")]
    IntegerOverflow { context: String },

    /// No disassembler for this machine
    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// Table ended early; entries past `parsed` were dropped
    #[error("Truncated table {table}: parsed {parsed} of {declared} entries")]
    TruncatedTable {
        table: String,
        parsed: usize,
        declared: usize,
    },

    /// Entry size smaller than the structure it must hold
    #[error("Invalid entry size for {table}: expected at least {expected}, got {found}")]
    InvalidEntrySize {
        table: String,
        expected: u64,
        found: u64,
    },

    /// `sh_link` does not name an existing section
    #[error("Section {section} links to missing section {link}")]
    InvalidSectionLink { section: usize, link: u32 },

    /// Cooperative cancellation observed between stages
    #[error("Analysis cancelled")]
    Cancelled,

    /// Background analysis exceeded its time limit
    #[error("Analysis timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// Background worker panicked or was aborted
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration rejected by validation or parsing
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AnalysisError {
    /// True for the errors that make the whole analysis meaningless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AnalysisError::NotAnElfFile
                | AnalysisError::UnsupportedElfVariant { .. }
                | AnalysisError::TruncatedHeader { .. }
                | AnalysisError::Cancelled
                | AnalysisError::Timeout { .. }
                | AnalysisError::Worker(_)
                | AnalysisError::InvalidConfig(_)
        )
    }
}

/// Result type alias for elfscope operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Pipeline stage a diagnostic was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    ProgramHeaders,
    SectionHeaders,
    Symbols,
    Relocations,
    Dynamic,
    Strings,
    Disassembly,
    CrossReferences,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::ProgramHeaders => "program-headers",
            Stage::SectionHeaders => "section-headers",
            Stage::Symbols => "symbols",
            Stage::Relocations => "relocations",
            Stage::Dynamic => "dynamic",
            Stage::Strings => "strings",
            Stage::Disassembly => "disassembly",
            Stage::CrossReferences => "xrefs",
        };
        f.write_str(s)
    }
}

/// A recoverable problem recorded next to partial results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub error: AnalysisError,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.error)
    }
}

/// Collector passed down the pipeline; every push is also logged.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: Stage, error: AnalysisError) {
        tracing::warn!(stage = %stage, error = %error, "recoverable analysis problem");
        self.items.push(Diagnostic { stage, error });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::OutOfBounds {
            offset: 0x1234,
            width: 4,
            length: 16,
        };
        assert_eq!(
            err.to_string(),
            "Read out of bounds at offset 0x1234 (width 4, length 16)"
        );

        let err = AnalysisError::TruncatedTable {
            table: "section headers".to_string(),
            parsed: 2,
            declared: 5,
        };
        assert_eq!(
            err.to_string(),
            "Truncated table section headers: parsed 2 of 5 entries"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AnalysisError::NotAnElfFile.is_fatal());
        assert!(AnalysisError::TruncatedHeader {
            needed: 64,
            available: 10
        }
        .is_fatal());
        assert!(!AnalysisError::TruncatedTable {
            table: "symbols".into(),
            parsed: 0,
            declared: 1
        }
        .is_fatal());
        assert!(!AnalysisError::UnsupportedArchitecture("mips".into()).is_fatal());
    }

    #[test]
    fn test_diagnostics_collect() {
        let mut diags = Diagnostics::new();
        assert!(diags.is_empty());
        diags.push(Stage::Symbols, AnalysisError::InvalidSectionLink { section: 3, link: 9 });
        assert_eq!(diags.len(), 1);
        let first = diags.iter().next().unwrap();
        assert_eq!(first.stage, Stage::Symbols);
        assert_eq!(first.to_string(), "[symbols] Section 3 links to missing section 9");
    }
}

//! Configuration for the analysis pipeline.
//!
//! Every section has defaults, so a partial JSON document (or `{}`) is a valid
//! configuration.

use crate::disasm::Architecture;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

/// Smallest disassembly window; one longest x86 instruction must fit.
pub const MIN_WINDOW_BYTES: u64 = 16;

/// Master configuration for [`crate::analysis::AnalysisFacade`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// String extraction configuration.
    pub strings: StringsConfig,
    /// Disassembly windows and engine overrides.
    pub disasm: DisasmConfig,
    /// Search limits.
    pub search: SearchConfig,
    /// Run symbol/relocation and string extraction in parallel.
    pub parallel: bool,
    /// Attach demangled names to symbols.
    pub demangle: bool,
    /// Time limit for background analysis, in seconds.
    pub timeout_seconds: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            strings: StringsConfig::default(),
            disasm: DisasmConfig::default(),
            search: SearchConfig::default(),
            parallel: true,
            demangle: true,
            timeout_seconds: 300,
        }
    }
}

impl AnalysisConfig {
    /// Parse from JSON and validate.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(text).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| AnalysisError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: &str| Err(AnalysisError::InvalidConfig(msg.to_string()));
        if self.strings.min_length == 0 {
            return bad("strings.min_length must be at least 1");
        }
        if let StringScope::Section(name) = &self.strings.scope {
            if name.is_empty() {
                return bad("strings.scope section name is empty");
            }
        }
        if self.disasm.window_bytes < MIN_WINDOW_BYTES {
            return bad("disasm.window_bytes must be at least 16");
        }
        if self.disasm.parallel_chunk_bytes == 0 {
            return bad("disasm.parallel_chunk_bytes must be non-zero");
        }
        if self.search.max_search_instructions == 0 {
            return bad("search.max_search_instructions must be non-zero");
        }
        if self.timeout_seconds == 0 {
            return bad("timeout_seconds must be non-zero");
        }
        Ok(())
    }
}

/// Where string extraction looks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StringScope {
    #[default]
    WholeImage,
    /// One named section, e.g. `.rodata`
    Section(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StringsConfig {
    /// Minimum length for a string candidate (in bytes)
    pub min_length: usize,
    pub scope: StringScope,
    /// Cap on distinct strings kept; `None` keeps everything
    pub max_results: Option<usize>,
}

impl Default for StringsConfig {
    fn default() -> Self {
        Self {
            min_length: 4,
            scope: StringScope::WholeImage,
            max_results: Some(100_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisasmConfig {
    /// Largest range a single disassembly request may cover
    pub window_bytes: u64,
    /// Sub-range size for parallel disassembly
    pub parallel_chunk_bytes: u64,
    /// Decode as this architecture instead of the one implied by `e_machine`
    pub architecture: Option<Architecture>,
}

impl Default for DisasmConfig {
    fn default() -> Self {
        Self {
            window_bytes: 1024 * 1024,
            parallel_chunk_bytes: 64 * 1024,
            architecture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Instructions decoded per search before giving up
    pub max_search_instructions: usize,
    pub max_results: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_search_instructions: 1_000_000,
            max_results: None,
        }
    }
}

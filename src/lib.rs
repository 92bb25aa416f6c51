//! elfscope: a static analysis engine for ELF binaries.
//!
//! The whole pipeline reads one immutable byte buffer. Structural results
//! (headers, tables, symbols, relocations, dynamic info, strings) are computed
//! once by [`AnalysisFacade::analyze`]; disassembly, cross-references and
//! search run on demand against the returned [`Analysis`].
//!
//! ```no_run
//! use elfscope::{AnalysisFacade, SearchFilter};
//!
//! let bytes = std::fs::read("/bin/true").unwrap();
//! let analysis = AnalysisFacade::default().analyze(bytes).unwrap();
//! for m in analysis.search("main", SearchFilter::Symbols) {
//!     println!("{:?} {:?} {}", m.category, m.address, m.text);
//! }
//! ```

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod demangle;
pub mod disasm;
pub mod elf;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod reader;
pub mod strings;
pub mod timeout;

pub use analysis::{
    Analysis, AnalysisFacade, CrossReference, MatchCategory, SearchFilter, SearchMatch, XrefIndex,
    XrefKind,
};
pub use cancel::CancellationToken;
pub use config::{AnalysisConfig, StringScope};
pub use disasm::{Architecture, DisassemblyAdapter, EngineAdapter, Instruction, InstructionStream};
pub use error::{AnalysisError, Diagnostic, Result, Stage};
pub use reader::{ByteReader, Endian};
pub use timeout::analyze_in_background;

/// Analyze `buffer` with the default configuration and bundled engines.
pub fn analyze(buffer: impl Into<std::sync::Arc<[u8]>>) -> Result<Analysis> {
    AnalysisFacade::default().analyze(buffer)
}

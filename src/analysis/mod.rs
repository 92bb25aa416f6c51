//! Analysis facade.
//!
//! [`AnalysisFacade::analyze`] runs the structural pipeline once and returns an
//! immutable [`Analysis`]. Disassembly, cross-references and instruction
//! search are computed on demand from the shared image:
//!
//! ```text
//! bytes -> header -> program/section headers -> (symbols, relocations, dynamic) | strings
//!                                                         \-> on demand: disassembly -> xrefs / search
//! ```

pub mod search;
pub mod xrefs;

use crate::cancel::CancellationToken;
use crate::config::{AnalysisConfig, StringScope};
use crate::disasm::{Architecture, DisassemblyAdapter, EngineAdapter, Instruction, InstructionStream};
use crate::elf::dynamic::{parse_dynamic, DynamicInfo};
use crate::elf::header::{parse_header, FileHeader};
use crate::elf::relocations::{extract_relocations, RelocationEntry};
use crate::elf::symbols::{self, extract_symbols, Symbol};
use crate::elf::tables::{
    parse_program_headers, parse_section_headers, resolve_counts, ProgramHeaderEntry,
    SectionHeaderEntry, SectionTable,
};
use crate::error::{AnalysisError, Diagnostic, Diagnostics, Result, Stage};
use crate::hashing::sha256_digest;
use crate::reader::{checked_add, to_usize, ByteReader};
use crate::strings::{extract_section_strings, extract_strings, ExtractedString};
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use search::{MatchCategory, Needle, SearchFilter, SearchMatch};
pub use xrefs::{CrossReference, XrefIndex, XrefKind};

/// Entry point: holds the configuration and the injected disassembler.
#[derive(Clone)]
pub struct AnalysisFacade {
    config: AnalysisConfig,
    adapter: Arc<dyn DisassemblyAdapter>,
}

impl Default for AnalysisFacade {
    fn default() -> Self {
        Self::new(AnalysisConfig::default())
    }
}

impl fmt::Debug for AnalysisFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisFacade")
            .field("config", &self.config)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// Output of the symbol/relocation/dynamic task.
struct TableStage {
    symbols: Vec<Symbol>,
    relocations: Vec<RelocationEntry>,
    dynamic: Option<DynamicInfo>,
    diags: Diagnostics,
}

impl AnalysisFacade {
    /// Facade backed by the bundled engines.
    pub fn new(config: AnalysisConfig) -> Self {
        Self::with_disassembler(config, Arc::new(EngineAdapter::new()))
    }

    pub fn with_disassembler(config: AnalysisConfig, adapter: Arc<dyn DisassemblyAdapter>) -> Self {
        Self { config, adapter }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn adapter(&self) -> Arc<dyn DisassemblyAdapter> {
        Arc::clone(&self.adapter)
    }

    /// Analyze a complete ELF image.
    pub fn analyze(&self, buffer: impl Into<Arc<[u8]>>) -> Result<Analysis> {
        self.analyze_with_cancel(buffer, &CancellationToken::new())
    }

    /// Like [`analyze`](Self::analyze), failing with `Cancelled` once `cancel`
    /// fires. The token is polled between stages and inside the string scan.
    pub fn analyze_with_cancel(
        &self,
        buffer: impl Into<Arc<[u8]>>,
        cancel: &CancellationToken,
    ) -> Result<Analysis> {
        self.config.validate()?;
        let image: Arc<[u8]> = buffer.into();
        let _span = crate::stage_span!("analyze", bytes = image.len()).entered();
        cancel.check()?;

        let header = {
            let _s = crate::stage_span!("header").entered();
            parse_header(&image).map_err(|e| crate::log_error!(e, "header rejected"))?
        };
        debug!(class = ?header.class, endian = ?header.endian, machine = %header.machine(), "parsed header");
        cancel.check()?;

        let reader = header.reader(&image);
        let mut diags = Diagnostics::new();
        let counts = resolve_counts(&reader, &header);
        let program_headers = {
            let _s = crate::stage_span!("program-headers").entered();
            parse_program_headers(&reader, &header, &counts, &mut diags)
        };
        cancel.check()?;
        let sections = {
            let _s = crate::stage_span!("section-headers").entered();
            parse_section_headers(&reader, &header, &counts, &mut diags)
        };
        debug!(
            segments = program_headers.len(),
            sections = sections.len(),
            "parsed tables"
        );
        cancel.check()?;

        let (tables, strings) = if self.config.parallel {
            rayon::join(
                || self.run_tables(&reader, &header, &sections),
                || self.run_strings(&image, &sections, cancel),
            )
        } else {
            let tables = self.run_tables(&reader, &header, &sections);
            (tables, self.run_strings(&image, &sections, cancel))
        };
        let (strings, string_diags) = strings?;
        diags.extend(tables.diags);
        diags.extend(string_diags);
        cancel.check()?;

        let sha256 = {
            let _s = crate::stage_span!("hash").entered();
            sha256_digest(&image)
        };
        cancel.check()?;

        info!(
            symbols = tables.symbols.len(),
            relocations = tables.relocations.len(),
            strings = strings.len(),
            diagnostics = diags.len(),
            "analysis complete"
        );

        Ok(Analysis {
            image,
            header,
            program_headers,
            sections,
            symbols: tables.symbols,
            relocations: tables.relocations,
            dynamic: tables.dynamic,
            strings,
            sha256,
            diagnostics: diags.into_vec(),
            config: self.config.clone(),
            adapter: Arc::clone(&self.adapter),
            xrefs: OnceCell::new(),
        })
    }

    fn run_tables(&self, reader: &ByteReader<'_>, header: &FileHeader, sections: &SectionTable) -> TableStage {
        let mut diags = Diagnostics::new();
        let symbols = {
            let _s = crate::stage_span!("symbols").entered();
            extract_symbols(reader, header, sections, self.config.demangle, &mut diags)
        };
        let relocations = {
            let _s = crate::stage_span!("relocations").entered();
            extract_relocations(reader, header, sections, &symbols, &mut diags)
        };
        let dynamic = {
            let _s = crate::stage_span!("dynamic").entered();
            parse_dynamic(reader, header, sections, &mut diags)
        };
        debug!(
            symbols = symbols.len(),
            relocations = relocations.len(),
            dynamic = dynamic.is_some(),
            "extracted tables"
        );
        TableStage {
            symbols,
            relocations,
            dynamic,
            diags,
        }
    }

    fn run_strings(
        &self,
        image: &[u8],
        sections: &SectionTable,
        cancel: &CancellationToken,
    ) -> Result<(Vec<ExtractedString>, Diagnostics)> {
        let _s = crate::stage_span!("strings").entered();
        let cfg = &self.config.strings;
        let mut diags = Diagnostics::new();
        let scanned = match &cfg.scope {
            StringScope::WholeImage => {
                extract_strings(image, 0, cfg.min_length, cfg.max_results, sections, cancel)
            }
            StringScope::Section(name) => match sections.by_name(name) {
                Some(section) => {
                    extract_section_strings(image, section, cfg.min_length, None, sections, cancel)
                }
                None => {
                    warn!(section = %name, "string scope names a missing section");
                    Ok(Vec::new())
                }
            },
        };
        let strings = match scanned {
            Ok(strings) => strings,
            Err(AnalysisError::Cancelled) => return Err(AnalysisError::Cancelled),
            Err(e) => {
                diags.push(Stage::Strings, e);
                Vec::new()
            }
        };
        debug!(count = strings.len(), "extracted strings");
        Ok((strings, diags))
    }
}

/// One file-backed code range.
#[derive(Debug, Clone, Copy)]
struct CodeRegion {
    offset: u64,
    len: u64,
    base: u64,
}

/// Result of one analysis run.
///
/// Structural results are computed eagerly; the cross-reference index is
/// built on first use and cached.
#[derive(Serialize)]
pub struct Analysis {
    #[serde(skip)]
    image: Arc<[u8]>,
    pub header: FileHeader,
    pub program_headers: Vec<ProgramHeaderEntry>,
    pub sections: SectionTable,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<RelocationEntry>,
    pub dynamic: Option<DynamicInfo>,
    pub strings: Vec<ExtractedString>,
    /// Hex SHA-256 of the whole image
    pub sha256: String,
    pub diagnostics: Vec<Diagnostic>,
    pub config: AnalysisConfig,
    #[serde(skip)]
    adapter: Arc<dyn DisassemblyAdapter>,
    #[serde(skip)]
    xrefs: OnceCell<XrefIndex>,
}

impl fmt::Debug for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analysis")
            .field("len", &self.image.len())
            .field("header", &self.header)
            .field("segments", &self.program_headers.len())
            .field("sections", &self.sections.len())
            .field("symbols", &self.symbols.len())
            .field("relocations", &self.relocations.len())
            .field("strings", &self.strings.len())
            .field("diagnostics", &self.diagnostics.len())
            .field("adapter", &self.adapter.name())
            .finish_non_exhaustive()
    }
}

impl Analysis {
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Architecture used for disassembly: the configured override, else the
    /// one implied by `e_machine`.
    pub fn architecture(&self) -> Result<Architecture> {
        match self.config.disasm.architecture {
            Some(arch) => Ok(arch),
            None => Architecture::from_machine(self.header.machine()),
        }
    }

    pub fn imports(&self) -> Vec<&Symbol> {
        symbols::imports(&self.symbols).collect()
    }

    pub fn exports(&self) -> Vec<&Symbol> {
        symbols::exports(&self.symbols).collect()
    }

    pub fn section(&self, name: &str) -> Option<&SectionHeaderEntry> {
        self.sections.by_name(name)
    }

    /// Raw bytes of a named section; empty for NOBITS.
    pub fn section_data(&self, name: &str) -> Option<&[u8]> {
        let section = self.sections.by_name(name)?;
        let reader = self.header.reader(&self.image);
        self.sections.data(&reader, section).ok()
    }

    /// File offset of a virtual address and the number of file bytes that
    /// follow it in the same segment (or section).
    fn backing(&self, vaddr: u64) -> Option<(u64, u64)> {
        for ph in self.program_headers.iter().filter(|p| p.is_load()) {
            if let Some(offset) = ph.vaddr_to_offset(vaddr) {
                return Some((offset, ph.file_size - (vaddr - ph.vaddr)));
            }
        }
        let section = self.sections.by_addr(vaddr).filter(|s| s.has_file_data())?;
        let delta = vaddr - section.addr;
        Some((section.offset.checked_add(delta)?, section.size - delta))
    }

    /// Translate a virtual address through LOAD segments, then sections.
    pub fn vaddr_to_offset(&self, vaddr: u64) -> Option<u64> {
        self.backing(vaddr).map(|(offset, _)| offset)
    }

    /// Strings of one section, rescanned without the whole-image cap.
    /// A missing section yields no strings.
    pub fn strings_in_section(&self, name: &str) -> Result<Vec<ExtractedString>> {
        let Some(section) = self.sections.by_name(name) else {
            warn!(section = %name, "no such section");
            return Ok(Vec::new());
        };
        extract_section_strings(
            &self.image,
            section,
            self.config.strings.min_length,
            None,
            &self.sections,
            &CancellationToken::new(),
        )
    }

    fn image_avail(&self, offset: u64) -> u64 {
        (self.image.len() as u64).saturating_sub(offset)
    }

    fn stream_at(&self, arch: Architecture, offset: u64, len: u64, base: u64) -> Result<InstructionStream> {
        let start = to_usize(offset, "disassembly start")?;
        let end = to_usize(checked_add(offset, len, "disassembly end")?, "disassembly end")?;
        InstructionStream::new(
            Arc::clone(&self.adapter),
            Arc::clone(&self.image),
            start,
            end,
            base,
            arch,
            self.header.endian,
        )
    }

    fn unmapped(&self, vaddr: u64, len: u64) -> AnalysisError {
        AnalysisError::OutOfBounds {
            offset: vaddr,
            width: len,
            length: self.image.len(),
        }
    }

    /// Lazy disassembly of `len` bytes at `vaddr`.
    ///
    /// The range is clamped to the configured window and to the file bytes
    /// backing `vaddr`.
    pub fn disassemble_range(&self, vaddr: u64, len: u64) -> Result<InstructionStream> {
        let arch = self.architecture()?;
        let (offset, avail) = self.backing(vaddr).ok_or_else(|| self.unmapped(vaddr, len))?;
        let window = self.config.disasm.window_bytes;
        if len > window {
            debug!(requested = len, window, "disassembly request clamped to window");
        }
        let len = len.min(window).min(avail).min(self.image_avail(offset));
        self.stream_at(arch, offset, len, vaddr)
    }

    /// Lazy disassembly of a named section, `None` if it does not exist.
    pub fn disassemble_section(&self, name: &str) -> Result<Option<InstructionStream>> {
        let Some(section) = self.sections.by_name(name) else {
            return Ok(None);
        };
        let arch = self.architecture()?;
        let len = if section.has_file_data() {
            section
                .size
                .min(self.config.disasm.window_bytes)
                .min(self.image_avail(section.offset))
        } else {
            0
        };
        let offset = if len == 0 { 0 } else { section.offset };
        self.stream_at(arch, offset, len, section.addr).map(Some)
    }

    /// Boundaries `[start, ..., end]` for parallel decoding. Fixed-width
    /// code splits on chunk multiples of 4; x86 only at function starts.
    fn split_points(&self, start: u64, end: u64, arch: Architecture) -> Vec<u64> {
        let chunk = self.config.disasm.parallel_chunk_bytes;
        let mut points = vec![start];
        if arch.is_fixed_width() {
            let step = chunk.div_ceil(4).max(1) * 4;
            let mut at = start.saturating_add(step);
            while at < end {
                points.push(at);
                at = at.saturating_add(step);
            }
        } else {
            let mut starts: Vec<u64> = self
                .symbols
                .iter()
                .filter(|s| s.is_function() && s.is_defined())
                .map(|s| s.value)
                .filter(|&a| a > start && a < end)
                .collect();
            starts.sort_unstable();
            starts.dedup();
            let mut last = start;
            for a in starts {
                if a - last >= chunk {
                    points.push(a);
                    last = a;
                }
            }
        }
        points.push(end);
        points
    }

    /// Decode `len` bytes at `vaddr` as independent sub-ranges and concatenate
    /// them in address order. Not limited by the disassembly window.
    pub fn disassemble_parallel(&self, vaddr: u64, len: u64) -> Result<Vec<Instruction>> {
        let arch = self.architecture()?;
        let (offset, avail) = self.backing(vaddr).ok_or_else(|| self.unmapped(vaddr, len))?;
        let len = len.min(avail).min(self.image_avail(offset));
        let points = self.split_points(vaddr, vaddr.saturating_add(len), arch);
        let ranges: Vec<(u64, u64)> = points
            .windows(2)
            .map(|w| (w[0], w[1]))
            .filter(|(s, e)| e > s)
            .collect();
        let _span = crate::stage_span!("disassemble", chunks = ranges.len()).entered();

        // Each task opens its own decoder
        let decode = |&(start, end): &(u64, u64)| -> Result<Vec<Instruction>> {
            let stream = self.stream_at(arch, offset + (start - vaddr), end - start, start)?;
            Ok(stream.collect())
        };
        let chunks: Vec<Vec<Instruction>> = if self.config.parallel {
            ranges.par_iter().map(decode).collect::<Result<_>>()?
        } else {
            ranges.iter().map(decode).collect::<Result<_>>()?
        };
        Ok(chunks.concat())
    }

    /// Executable sections, or executable LOAD segments when there are none.
    fn code_regions(&self) -> Vec<CodeRegion> {
        let clamp = |offset: u64, len: u64, base: u64| CodeRegion {
            offset,
            len: len.min(self.image_avail(offset)),
            base,
        };
        let mut regions: Vec<CodeRegion> = self
            .sections
            .executable()
            .map(|s| clamp(s.offset, s.size, s.addr))
            .filter(|r| r.len > 0)
            .collect();
        if regions.is_empty() {
            regions = self
                .program_headers
                .iter()
                .filter(|p| p.is_load() && p.is_executable())
                .map(|p| clamp(p.offset, p.file_size, p.vaddr))
                .filter(|r| r.len > 0)
                .collect();
        }
        regions
    }

    /// Visit every instruction of every code region, one window at a time.
    ///
    /// Near the end of a non-final window an instruction may be cut short, so
    /// once fewer than the longest encoding remains the next window restarts
    /// at that instruction. `visit` returning false stops the walk.
    fn walk_code<F>(&self, arch: Architecture, mut visit: F) -> Result<()>
    where
        F: FnMut(&Instruction) -> bool,
    {
        let window = self.config.disasm.window_bytes;
        let longest = arch.max_instruction_len() as u64;
        for region in self.code_regions() {
            let mut pos = 0u64;
            while pos < region.len {
                let remaining = region.len - pos;
                let take = remaining.min(window);
                let last = take == remaining;
                let stream = self.stream_at(arch, region.offset + pos, take, region.base.wrapping_add(pos))?;
                let mut next = pos + take;
                for ins in stream {
                    let rel = ins.address.wrapping_sub(region.base);
                    if !last && rel > pos && take - (rel - pos) < longest {
                        next = rel;
                        break;
                    }
                    if !visit(&ins) {
                        return Ok(());
                    }
                }
                pos = next;
            }
        }
        Ok(())
    }

    fn build_xrefs(&self) -> XrefIndex {
        let _span = crate::stage_span!("xrefs").entered();
        let mut builder = xrefs::XrefBuilder::new(&self.symbols, &self.strings);
        let walked = self.architecture().and_then(|arch| {
            self.walk_code(arch, |ins| {
                builder.add_instruction(ins);
                true
            })
        });
        if let Err(e) = walked {
            builder.add_diagnostic(Stage::CrossReferences, e);
        }
        builder.finish()
    }

    /// The cross-reference index, built on first call.
    pub fn cross_references(&self) -> &XrefIndex {
        self.xrefs.get_or_init(|| self.build_xrefs())
    }

    /// Everything that refers to `addr`.
    pub fn find_references(&self, addr: u64) -> Vec<&CrossReference> {
        self.cross_references().find_references(addr)
    }

    /// Address of a symbol by raw or demangled name.
    pub fn jump_to(&self, name: &str) -> Option<u64> {
        self.cross_references().jump_to(name)
    }

    /// Case-insensitive substring search; see [`SearchFilter`].
    pub fn search(&self, query: &str, filter: SearchFilter) -> Vec<SearchMatch> {
        let Some(needle) = search::Needle::new(query) else {
            return Vec::new();
        };
        let _span = crate::stage_span!("search", filter = ?filter).entered();
        let mut matches = search::search_tables(&self.symbols, &self.strings, &needle, filter);

        if filter.wants_code() {
            let cap = self.config.search.max_search_instructions;
            let mut scanned = 0usize;
            let walked = self.architecture().and_then(|arch| {
                self.walk_code(arch, |ins| {
                    scanned += 1;
                    search::match_instruction(ins, &needle, filter, &mut matches);
                    scanned < cap
                })
            });
            if let Err(e) = walked {
                warn!(error = %e, "instruction search unavailable");
            }
            if scanned >= cap {
                debug!(cap, "instruction search cap reached");
            }
        }

        search::sort_matches(&mut matches);
        if let Some(max) = self.config.search.max_results {
            matches.truncate(max);
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::testing::WordAdapter;

    /// ELF64 LE AArch64 executable: one R+X LOAD segment mapping `code` at
    /// 0x1000 from file offset 0x80, and no section headers.
    fn arm64_image(code_words: &[u32]) -> Vec<u8> {
        let code: Vec<u8> = code_words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut b = Vec::new();
        b.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
        b.resize(16, 0);
        b.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
        b.extend_from_slice(&183u16.to_le_bytes()); // EM_AARCH64
        b.extend_from_slice(&1u32.to_le_bytes());
        b.extend_from_slice(&0x1000u64.to_le_bytes()); // entry
        b.extend_from_slice(&64u64.to_le_bytes()); // phoff
        b.extend_from_slice(&0u64.to_le_bytes()); // shoff
        b.extend_from_slice(&0u32.to_le_bytes());
        for v in [64u16, 56, 1, 64, 0, 0] {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b.extend_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        b.extend_from_slice(&5u32.to_le_bytes()); // R+X
        for v in [0x80u64, 0x1000, 0x1000, code.len() as u64, code.len() as u64, 0x1000] {
            b.extend_from_slice(&v.to_le_bytes());
        }
        b.resize(0x80, 0);
        b.extend_from_slice(&code);
        b
    }

    fn facade(cfg: AnalysisConfig) -> AnalysisFacade {
        AnalysisFacade::with_disassembler(cfg, Arc::new(WordAdapter))
    }

    #[test]
    fn analyzes_segment_only_image() {
        let analysis = facade(AnalysisConfig::default())
            .analyze(arm64_image(&[0x2000, 0]))
            .unwrap();
        assert_eq!(analysis.header.entry_point(), 0x1000);
        assert_eq!(analysis.program_headers.len(), 1);
        assert!(analysis.sections.is_empty());
        assert!(analysis.symbols.is_empty());
        assert!(analysis.diagnostics.is_empty(), "{:?}", analysis.diagnostics);
        assert_eq!(analysis.sha256.len(), 64);
        assert_eq!(analysis.architecture().unwrap(), Architecture::Arm64);
        assert_eq!(analysis.vaddr_to_offset(0x1004), Some(0x84));
        assert_eq!(analysis.vaddr_to_offset(0x5000), None);
    }

    #[test]
    fn range_is_clamped_to_window_and_segment() {
        let mut cfg = AnalysisConfig::default();
        cfg.disasm.window_bytes = 16;
        let words = [0x2000, 0, 0x3000, 0, 0x2000, 0, 0x3000, 0];
        let analysis = facade(cfg).analyze(arm64_image(&words)).unwrap();
        let ins: Vec<_> = analysis.disassemble_range(0x1000, 32).unwrap().collect();
        assert_eq!(ins.len(), 4);
        assert_eq!(ins[0].mnemonic, "bl");
        assert_eq!(ins[3].mnemonic, "ret");

        // Past the end of the segment's file bytes
        let tail: Vec<_> = analysis.disassemble_range(0x101c, 64).unwrap().collect();
        assert_eq!(tail.len(), 1);
        assert!(matches!(
            analysis.disassemble_range(0x9000, 4),
            Err(AnalysisError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn windows_restart_at_cut_instructions() {
        let mut cfg = AnalysisConfig::default();
        // The first window ends two bytes into the fifth word
        cfg.disasm.window_bytes = 18;
        let words = [0x2000, 0, 0x3000, 0, 0x2000, 0, 0, 0x3000];
        let analysis = facade(cfg).analyze(arm64_image(&words)).unwrap();
        let index = analysis.cross_references();
        assert_eq!(index.instructions_scanned(), 8);
        assert!(index.diagnostics().is_empty());

        let found = analysis.search("BL", SearchFilter::Instructions);
        let addrs: Vec<_> = found.iter().map(|m| m.address).collect();
        assert_eq!(addrs, vec![Some(0x1000), Some(0x1008), Some(0x1010), Some(0x101c)]);
    }

    #[test]
    fn parallel_matches_sequential() {
        let words: Vec<u32> = (1..=16).map(|i| if i % 3 == 0 { 0 } else { 0x4000 + i }).collect();
        let mut cfg = AnalysisConfig::default();
        cfg.disasm.parallel_chunk_bytes = 10;
        let analysis = facade(cfg).analyze(arm64_image(&words)).unwrap();
        let sequential: Vec<_> = analysis.disassemble_range(0x1000, 64).unwrap().collect();
        let parallel = analysis.disassemble_parallel(0x1000, 64).unwrap();
        assert_eq!(parallel.len(), 16);
        assert_eq!(parallel, sequential);
        assert_eq!(analysis.split_points(0x1000, 0x1040, Architecture::Arm64)[1], 0x100c);
    }

    #[test]
    fn unsupported_architecture_keeps_results() {
        let mut cfg = AnalysisConfig::default();
        cfg.disasm.architecture = Some(Architecture::X86_64);
        let analysis = facade(cfg).analyze(arm64_image(&[0x2000])).unwrap();
        assert!(matches!(
            analysis.disassemble_range(0x1000, 4),
            Err(AnalysisError::UnsupportedArchitecture(_))
        ));
        let index = analysis.cross_references();
        assert_eq!(index.diagnostics().len(), 1);
        assert_eq!(index.diagnostics()[0].stage, Stage::CrossReferences);
        assert!(analysis.search("bl", SearchFilter::All).is_empty());
        assert_eq!(analysis.program_headers.len(), 1);
    }

    #[test]
    fn cancelled_and_invalid_runs_fail() {
        let token = CancellationToken::new();
        token.cancel();
        let err = facade(AnalysisConfig::default())
            .analyze_with_cancel(arm64_image(&[0]), &token)
            .unwrap_err();
        assert_eq!(err, AnalysisError::Cancelled);

        let mut cfg = AnalysisConfig::default();
        cfg.disasm.window_bytes = 0;
        assert!(matches!(
            facade(cfg).analyze(arm64_image(&[0])),
            Err(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let analysis = facade(AnalysisConfig::default()).analyze(arm64_image(&[0])).unwrap();
        assert!(analysis.search("", SearchFilter::All).is_empty());
    }
}

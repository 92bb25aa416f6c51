#![no_main]
use elfscope::{AnalysisConfig, AnalysisFacade, SearchFilter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cfg = AnalysisConfig::default();
    cfg.disasm.window_bytes = 4096;
    cfg.search.max_search_instructions = 10_000;
    let facade = AnalysisFacade::with_disassembler(cfg, std::sync::Arc::new(elfscope::EngineAdapter::new()));
    if let Ok(analysis) = facade.analyze(data) {
        let _ = analysis.cross_references().len();
        let _ = analysis.search("a", SearchFilter::All);
        let _ = analysis.disassemble_parallel(analysis.header.entry_point(), 256);
    }
});

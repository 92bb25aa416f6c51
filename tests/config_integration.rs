mod common;

use common::{license_fixture, ElfBuilder};
use elfscope::config::StringScope;
use elfscope::{AnalysisConfig, AnalysisError, AnalysisFacade, Architecture, SearchFilter};

#[test]
fn partial_json_fills_defaults() {
    let cfg = AnalysisConfig::from_json(
        r#"{ "strings": { "min_length": 8, "scope": { "section": ".rodata" } },
             "disasm": { "architecture": "x86_64" } }"#,
    )
    .unwrap();
    assert_eq!(cfg.strings.min_length, 8);
    assert_eq!(cfg.strings.scope, StringScope::Section(".rodata".into()));
    assert_eq!(cfg.disasm.architecture, Some(Architecture::X86_64));
    assert_eq!(cfg.disasm.window_bytes, AnalysisConfig::default().disasm.window_bytes);
    assert!(cfg.parallel);

    let back = AnalysisConfig::from_json(&cfg.to_json().unwrap()).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn invalid_json_config_is_rejected() {
    assert!(matches!(
        AnalysisConfig::from_json(r#"{ "disasm": { "window_bytes": 0 } }"#),
        Err(AnalysisError::InvalidConfig(_))
    ));
    assert!(matches!(
        AnalysisConfig::from_json(r#"{ "disasm": { "window_bytes": 8 } }"#),
        Err(AnalysisError::InvalidConfig(_))
    ));
    assert!(matches!(
        AnalysisConfig::from_json("not json"),
        Err(AnalysisError::InvalidConfig(_))
    ));
}

#[test]
fn min_length_filters_strings() {
    let bytes = ElfBuilder::x86_64()
        .rodata_strings(&["short", "a much longer string"])
        .build();
    let cfg = AnalysisConfig::from_json(r#"{ "strings": { "min_length": 10 } }"#).unwrap();
    let analysis = AnalysisFacade::new(cfg).analyze(bytes).unwrap();
    assert!(analysis.strings.iter().all(|s| s.content.len() >= 10));
    assert!(analysis
        .strings
        .iter()
        .any(|s| s.content == "a much longer string"));
}

#[test]
fn search_result_cap_applies() {
    let (_, bytes) = license_fixture();
    let mut cfg = AnalysisConfig::default();
    cfg.search.max_results = Some(1);
    let analysis = AnalysisFacade::new(cfg).analyze(bytes).unwrap();
    assert_eq!(analysis.search("e", SearchFilter::All).len(), 1);
}

#[test]
fn sequential_and_parallel_runs_agree() {
    let (_, bytes) = license_fixture();
    let mut cfg = AnalysisConfig::default();
    cfg.parallel = false;
    let sequential = AnalysisFacade::new(cfg).analyze(bytes.clone()).unwrap();
    let parallel = AnalysisFacade::default().analyze(bytes).unwrap();
    assert_eq!(sequential.symbols, parallel.symbols);
    assert_eq!(sequential.strings, parallel.strings);
    assert_eq!(sequential.relocations, parallel.relocations);
    assert_eq!(sequential.sha256, parallel.sha256);
}

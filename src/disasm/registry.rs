//! Default engine selection.

use super::{Architecture, DisassemblyAdapter, InstructionDecoder};
use crate::error::{AnalysisError, Result};
use crate::reader::Endian;

/// Bundled engines: iced-x86 for x86/x64, capstone for ARM/AArch64.
///
/// Without the `engines` feature it supports nothing and every request fails
/// with `UnsupportedArchitecture`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineAdapter;

impl EngineAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Engine that serves `arch`, for display.
    pub fn backend_name(arch: Architecture) -> &'static str {
        match arch {
            Architecture::X86 | Architecture::X86_64 => "iced-x86",
            Architecture::Arm64 | Architecture::Arm32 => "capstone",
        }
    }
}

impl DisassemblyAdapter for EngineAdapter {
    fn name(&self) -> &str {
        "engines"
    }

    fn supports(&self, _arch: Architecture) -> bool {
        cfg!(feature = "engines")
    }

    #[cfg(feature = "engines")]
    fn decoder(&self, arch: Architecture, endian: Endian) -> Result<Box<dyn InstructionDecoder>> {
        match arch {
            Architecture::X86 | Architecture::X86_64 => super::iced::IcedDecoder::new(arch)
                .map(|d| Box::new(d) as Box<dyn InstructionDecoder>)
                .ok_or_else(|| AnalysisError::UnsupportedArchitecture(arch.to_string())),
            Architecture::Arm64 | Architecture::Arm32 => {
                let d = super::capstone::CapstoneDecoder::new(arch, endian)?;
                Ok(Box::new(d))
            }
        }
    }

    #[cfg(not(feature = "engines"))]
    fn decoder(&self, arch: Architecture, _endian: Endian) -> Result<Box<dyn InstructionDecoder>> {
        Err(AnalysisError::UnsupportedArchitecture(arch.to_string()))
    }
}

//! Disassembly boundary.
//!
//! Instruction decoding is delegated to external engines behind
//! [`DisassemblyAdapter`]. The adapter is shared (`Send + Sync`); each
//! [`InstructionStream`] asks it for its own [`InstructionDecoder`], so every
//! worker owns the engine handle it decodes with.
//!
//! Engines:
//! - iced-x86 for x86/x64
//! - capstone for ARM/AArch64

#[cfg(feature = "engines")]
pub mod capstone;
#[cfg(feature = "engines")]
pub mod iced;
pub mod registry;

use crate::elf::types::ElfMachine;
use crate::error::{AnalysisError, Result};
use crate::reader::Endian;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use registry::EngineAdapter;

/// Instruction set the stream decodes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    Arm64,
    Arm32,
    X86,
    X86_64,
}

impl Architecture {
    /// Map an ELF machine to a decodable architecture.
    pub fn from_machine(machine: ElfMachine) -> Result<Self> {
        match machine {
            ElfMachine::AArch64 => Ok(Architecture::Arm64),
            ElfMachine::Arm => Ok(Architecture::Arm32),
            ElfMachine::X86 => Ok(Architecture::X86),
            ElfMachine::X86_64 => Ok(Architecture::X86_64),
            other => Err(AnalysisError::UnsupportedArchitecture(other.to_string())),
        }
    }

    /// Bytes consumed by a `(bad)` pseudo-instruction.
    pub fn min_instruction_len(&self) -> usize {
        match self {
            Architecture::Arm64 | Architecture::Arm32 => 4,
            Architecture::X86 | Architecture::X86_64 => 1,
        }
    }

    pub fn max_instruction_len(&self) -> usize {
        match self {
            Architecture::Arm64 | Architecture::Arm32 => 4,
            Architecture::X86 | Architecture::X86_64 => 15,
        }
    }

    /// Fixed-width encodings can be split at any aligned offset.
    pub fn is_fixed_width(&self) -> bool {
        matches!(self, Architecture::Arm64 | Architecture::Arm32)
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Architecture::Arm64 => "arm64",
            Architecture::Arm32 => "arm",
            Architecture::X86 => "x86",
            Architecture::X86_64 => "x86_64",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    Register,
    Immediate,
    Memory,
    Other,
}

/// A decoded operand with its formatted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operand {
    pub kind: OperandKind,
    pub text: String,
    pub register: Option<String>,
    pub immediate: Option<i64>,
    pub displacement: Option<i64>,
    pub base: Option<String>,
    pub index: Option<String>,
    /// Absolute address this operand resolves to (branch target, PC-relative
    /// memory, absolute memory)
    pub target: Option<u64>,
}

impl Operand {
    fn blank(kind: OperandKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            register: None,
            immediate: None,
            displacement: None,
            base: None,
            index: None,
            target: None,
        }
    }

    pub fn register(text: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            register: Some(name.into()),
            ..Self::blank(OperandKind::Register, text)
        }
    }

    pub fn immediate(text: impl Into<String>, value: i64) -> Self {
        Self {
            immediate: Some(value),
            ..Self::blank(OperandKind::Immediate, text)
        }
    }

    pub fn memory(
        text: impl Into<String>,
        displacement: Option<i64>,
        base: Option<String>,
        index: Option<String>,
    ) -> Self {
        Self {
            displacement,
            base,
            index,
            ..Self::blank(OperandKind::Memory, text)
        }
    }

    pub fn other(text: impl Into<String>) -> Self {
        Self::blank(OperandKind::Other, text)
    }

    pub fn with_target(mut self, target: Option<u64>) -> Self {
        self.target = target;
        self
    }
}

/// Control-flow role of an instruction, from its mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Call,
    Jump,
    Other,
}

const ARM_CONDITIONS: &[&str] = &[
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
    "al",
];

fn is_condition(suffix: Option<&str>) -> bool {
    suffix.is_some_and(|c| ARM_CONDITIONS.contains(&c))
}

/// Classify a mnemonic as call, jump or neither.
pub fn classify_mnemonic(mnemonic: &str) -> Flow {
    let m = mnemonic.trim().to_ascii_lowercase();
    let m = m.rsplit(' ').next().unwrap_or(""); // drop prefixes like "bnd"
    match m {
        "call" | "bl" | "blr" | "blx" | "blraa" | "blrab" => Flow::Call,
        "jmp" | "b" | "br" | "bx" | "cbz" | "cbnz" | "tbz" | "tbnz" | "braa" | "brab" => {
            Flow::Jump
        }
        _ if m.starts_with("b.") => Flow::Jump,
        _ if m.starts_with('j') => Flow::Jump,
        _ if m.len() == 3 && m.starts_with('b') && is_condition(m.get(1..)) => Flow::Jump,
        _ if m.len() == 4 && m.starts_with("bl") && is_condition(m.get(2..)) => Flow::Call,
        _ => Flow::Other,
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u64,
    pub bytes: Vec<u8>,
    pub mnemonic: String,
    pub op_str: String,
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Mnemonic used for bytes no engine could decode.
    pub const BAD: &'static str = "(bad)";

    pub fn bad(address: u64, bytes: &[u8]) -> Self {
        Self {
            address,
            bytes: bytes.to_vec(),
            mnemonic: Self::BAD.to_string(),
            op_str: String::new(),
            operands: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn end_address(&self) -> u64 {
        self.address.saturating_add(self.bytes.len() as u64)
    }

    pub fn is_bad(&self) -> bool {
        self.mnemonic == Self::BAD
    }

    pub fn flow(&self) -> Flow {
        classify_mnemonic(&self.mnemonic)
    }

    /// `mnemonic op_str`
    pub fn text(&self) -> String {
        if self.op_str.is_empty() {
            self.mnemonic.clone()
        } else {
            format!("{} {}", self.mnemonic, self.op_str)
        }
    }
}

/// Decodes one instruction at a time. Not shared between streams.
pub trait InstructionDecoder {
    /// Decode the instruction at the start of `code`, located at `address`.
    /// `None` means the bytes are undecodable.
    fn decode(&mut self, code: &[u8], address: u64) -> Option<Instruction>;
}

/// Capability boundary over a disassembly engine.
pub trait DisassemblyAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, arch: Architecture) -> bool;

    /// A fresh decoder for one stream, or `UnsupportedArchitecture`.
    fn decoder(&self, arch: Architecture, endian: Endian) -> Result<Box<dyn InstructionDecoder>>;
}

/// Lazy, restartable instruction sequence over `[start, end)` of an image.
///
/// Cloning yields an independent stream at the same position; the clone opens
/// its own decoder on first use.
pub struct InstructionStream {
    image: Arc<[u8]>,
    start: usize,
    end: usize,
    base: u64,
    pos: usize,
    arch: Architecture,
    endian: Endian,
    adapter: Arc<dyn DisassemblyAdapter>,
    decoder: Option<Box<dyn InstructionDecoder>>,
}

impl InstructionStream {
    /// Stream over `image[start..end]`, whose first byte is at `base`.
    pub fn new(
        adapter: Arc<dyn DisassemblyAdapter>,
        image: Arc<[u8]>,
        start: usize,
        end: usize,
        base: u64,
        arch: Architecture,
        endian: Endian,
    ) -> Result<Self> {
        if start > end || end > image.len() {
            return Err(AnalysisError::OutOfBounds {
                offset: start as u64,
                width: end.saturating_sub(start) as u64,
                length: image.len(),
            });
        }
        // Fail early for architectures the adapter cannot serve
        let decoder = adapter.decoder(arch, endian)?;
        Ok(Self {
            image,
            start,
            end,
            base,
            pos: 0,
            arch,
            endian,
            adapter,
            decoder: Some(decoder),
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn base_address(&self) -> u64 {
        self.base
    }

    /// Length of the covered range in bytes.
    pub fn range_len(&self) -> usize {
        self.end - self.start
    }

    /// Rewind to the first instruction.
    pub fn restart(&mut self) {
        self.pos = 0;
    }
}

impl Clone for InstructionStream {
    fn clone(&self) -> Self {
        Self {
            image: Arc::clone(&self.image),
            start: self.start,
            end: self.end,
            base: self.base,
            pos: self.pos,
            arch: self.arch,
            endian: self.endian,
            adapter: Arc::clone(&self.adapter),
            decoder: None,
        }
    }
}

impl fmt::Debug for InstructionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionStream")
            .field("base", &format_args!("{:#x}", self.base))
            .field("len", &self.range_len())
            .field("pos", &self.pos)
            .field("arch", &self.arch)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl Iterator for InstructionStream {
    type Item = Instruction;

    fn next(&mut self) -> Option<Instruction> {
        let len = self.end - self.start;
        if self.pos >= len {
            return None;
        }
        if self.decoder.is_none() {
            match self.adapter.decoder(self.arch, self.endian) {
                Ok(d) => self.decoder = Some(d),
                Err(err) => {
                    tracing::warn!(error = %err, "could not reopen decoder");
                    self.pos = len;
                    return None;
                }
            }
        }
        let code = &self.image[self.start + self.pos..self.end];
        let address = self.base.wrapping_add(self.pos as u64);
        let decoded = self
            .decoder
            .as_mut()
            .and_then(|d| d.decode(code, address))
            .filter(|ins| !ins.is_empty() && ins.len() <= code.len());
        let ins = match decoded {
            Some(ins) => ins,
            None => {
                let width = self.arch.min_instruction_len().min(code.len());
                Instruction::bad(address, &code[..width])
            }
        };
        self.pos += ins.len();
        Some(ins)
    }
}

/// Disassemble standalone code bytes located at `base`.
pub fn disassemble(
    adapter: Arc<dyn DisassemblyAdapter>,
    code: &[u8],
    base: u64,
    arch: Architecture,
    endian: Endian,
) -> Result<InstructionStream> {
    let image: Arc<[u8]> = Arc::from(code);
    let end = image.len();
    InstructionStream::new(adapter, image, 0, end, base, arch, endian)
}

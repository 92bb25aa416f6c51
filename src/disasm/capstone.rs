//! capstone backend for ARM and AArch64.

use super::{classify_mnemonic, Architecture, Flow, Instruction, InstructionDecoder, Operand};
use crate::error::{AnalysisError, Result};
use crate::reader::Endian;
use capstone::arch::arm::ArmOperandType;
use capstone::arch::arm64::Arm64OperandType;
use capstone::prelude::*;
use capstone::{Arch, Capstone, Endian as CsEndian, Mode, NO_EXTRA_MODE};

pub struct CapstoneDecoder {
    cs: Capstone,
    arch: Architecture,
}

impl CapstoneDecoder {
    pub fn new(arch: Architecture, endian: Endian) -> Result<Self> {
        let cs_arch = match arch {
            Architecture::Arm64 => Arch::ARM64,
            Architecture::Arm32 => Arch::ARM,
            _ => return Err(AnalysisError::UnsupportedArchitecture(arch.to_string())),
        };
        let cs_endian = if endian.is_little_endian() {
            CsEndian::Little
        } else {
            CsEndian::Big
        };
        let mut cs = Capstone::new_raw(cs_arch, Mode::Arm, NO_EXTRA_MODE, Some(cs_endian))
            .map_err(|e| AnalysisError::UnsupportedArchitecture(format!("{}: {}", arch, e)))?;
        // Details recover structured operands (needed for PC-relative addressing)
        if let Err(e) = cs.set_detail(true) {
            tracing::debug!(error = %e, "capstone detail mode unavailable");
        }
        Ok(Self { cs, arch })
    }

    fn reg(&self, id: RegId) -> Option<String> {
        (id.0 != 0).then(|| self.cs.reg_name(id).unwrap_or_default())
    }

    /// Structured operands from capstone detail, without text.
    fn detailed_operands(&self, insn: &capstone::Insn<'_>) -> Vec<Operand> {
        let mut out = Vec::new();
        let Ok(detail) = self.cs.insn_detail(insn) else {
            return out;
        };
        let arch_detail = detail.arch_detail();
        match self.arch {
            Architecture::Arm64 => {
                if let Some(ad) = arch_detail.arm64() {
                    for op in ad.operands() {
                        out.push(match op.op_type {
                            Arm64OperandType::Reg(r) => {
                                let name = self.reg(r).unwrap_or_default();
                                Operand::register(name.clone(), name)
                            }
                            Arm64OperandType::Imm(i) => Operand::immediate(String::new(), i),
                            Arm64OperandType::Mem(m) => Operand::memory(
                                String::new(),
                                Some(i64::from(m.disp())),
                                self.reg(m.base()),
                                self.reg(m.index()),
                            ),
                            _ => Operand::other(String::new()),
                        });
                    }
                }
            }
            Architecture::Arm32 => {
                if let Some(ad) = arch_detail.arm() {
                    for op in ad.operands() {
                        out.push(match op.op_type {
                            ArmOperandType::Reg(r) => {
                                let name = self.reg(r).unwrap_or_default();
                                Operand::register(name.clone(), name)
                            }
                            ArmOperandType::Imm(i) => {
                                Operand::immediate(String::new(), i64::from(i))
                            }
                            ArmOperandType::Mem(m) => Operand::memory(
                                String::new(),
                                Some(i64::from(m.disp())),
                                self.reg(m.base()),
                                self.reg(m.index()),
                            ),
                            _ => Operand::other(String::new()),
                        });
                    }
                }
            }
            _ => {}
        }
        out
    }
}

/// Split an operand string on top-level commas (not inside `[]` or `{}`).
pub(crate) fn split_operands(op_str: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut cur = String::new();
    for c in op_str.chars() {
        match c {
            '[' | '{' => depth += 1,
            ']' | '}' => depth -= 1,
            ',' if depth <= 0 => {
                out.push(cur.trim().to_string());
                cur.clear();
                continue;
            }
            _ => {}
        }
        cur.push(c);
    }
    if !cur.trim().is_empty() {
        out.push(cur.trim().to_string());
    }
    out
}

fn parse_number(s: &str) -> Option<i64> {
    let s = s.trim().trim_start_matches('#');
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = match s.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => s.parse::<i64>().ok()?,
    };
    Some(if neg { -v } else { v })
}

/// Operands from text alone, when detail is unavailable.
fn parse_operands_simple(op_str: &str) -> Vec<Operand> {
    split_operands(op_str)
        .into_iter()
        .map(|tok| {
            let lower = tok.to_ascii_lowercase();
            if let (Some(l), Some(r)) = (lower.find('['), lower.find(']')) {
                let mut parts = lower[(l + 1)..r].split(',').map(str::trim);
                let base = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
                let disp = parts.find_map(parse_number);
                Operand::memory(tok, disp, base, None)
            } else if let Some(v) = parse_number(&lower) {
                Operand::immediate(tok, v)
            } else {
                Operand::register(tok.clone(), lower)
            }
        })
        .collect()
}

impl InstructionDecoder for CapstoneDecoder {
    fn decode(&mut self, code: &[u8], address: u64) -> Option<Instruction> {
        let insns = self.cs.disasm_count(code, address, 1).ok()?;
        let insn = insns.iter().next()?;
        let mnemonic = insn.mnemonic().unwrap_or("").to_string();
        let op_str = insn.op_str().unwrap_or("").to_string();
        let texts = split_operands(&op_str);

        let mut operands = self.detailed_operands(&insn);
        if operands.is_empty() && !texts.is_empty() {
            operands = parse_operands_simple(&op_str);
        } else if operands.len() == texts.len() {
            for (op, text) in operands.iter_mut().zip(texts) {
                op.text = text;
            }
        } else {
            for op in operands.iter_mut().filter(|o| o.text.is_empty()) {
                op.text = match (op.immediate, &op.register) {
                    (Some(v), _) => format!("#{:#x}", v),
                    (None, Some(r)) => r.clone(),
                    _ => String::new(),
                };
            }
        }

        // Branch and ADR/ADRP immediates are absolute addresses
        let absolute = matches!(classify_mnemonic(&mnemonic), Flow::Call | Flow::Jump)
            || matches!(mnemonic.as_str(), "adr" | "adrp");
        if absolute {
            for op in operands.iter_mut() {
                if let Some(v) = op.immediate {
                    op.target = u64::try_from(v).ok();
                }
            }
        }

        Some(Instruction {
            address,
            bytes: insn.bytes().to_vec(),
            mnemonic,
            op_str,
            operands,
        })
    }
}

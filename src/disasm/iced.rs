//! iced-x86 backend for x86 and x86-64.

use super::{Architecture, Instruction, InstructionDecoder, Operand};
use iced_x86::{Decoder, DecoderOptions, Formatter, IntelFormatter, OpKind, Register};

pub struct IcedDecoder {
    bitness: u32,
    formatter: IntelFormatter,
}

impl IcedDecoder {
    pub fn new(arch: Architecture) -> Option<Self> {
        let bitness = match arch {
            Architecture::X86 => 32,
            Architecture::X86_64 => 64,
            _ => return None,
        };
        let mut formatter = IntelFormatter::new();
        // 0x-prefixed lowercase hex, so operand text can be matched as literals
        let opts = formatter.options_mut();
        opts.set_hex_prefix("0x");
        opts.set_hex_suffix("");
        opts.set_uppercase_hex(false);
        opts.set_branch_leading_zeros(false);
        opts.set_space_after_operand_separator(true);
        Some(Self { bitness, formatter })
    }
}

fn reg_name(r: Register) -> Option<String> {
    (r != Register::None).then(|| format!("{:?}", r).to_ascii_lowercase())
}

/// Structured operand `op` of `instr`, paired with its formatted text.
fn structured(instr: &iced_x86::Instruction, op: u32, text: String) -> Operand {
    match instr.op_kind(op) {
        OpKind::Register => {
            let name = reg_name(instr.op_register(op)).unwrap_or_default();
            Operand::register(text, name)
        }
        OpKind::Memory => {
            let base = reg_name(instr.memory_base());
            let index = reg_name(instr.memory_index());
            let disp = instr.memory_displacement64();
            let target = if instr.is_ip_rel_memory_operand() {
                Some(instr.ip_rel_memory_address())
            } else if base.is_none() && index.is_none() {
                Some(disp)
            } else {
                None
            };
            Operand::memory(text, Some(disp as i64), base, index).with_target(target)
        }
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            let target = instr.near_branch_target();
            Operand::immediate(text, target as i64).with_target(Some(target))
        }
        OpKind::Immediate8
        | OpKind::Immediate8_2nd
        | OpKind::Immediate16
        | OpKind::Immediate32
        | OpKind::Immediate64
        | OpKind::Immediate8to16
        | OpKind::Immediate8to32
        | OpKind::Immediate8to64
        | OpKind::Immediate32to64 => Operand::immediate(text, instr.immediate(op) as i64),
        _ => Operand::other(text),
    }
}

impl InstructionDecoder for IcedDecoder {
    fn decode(&mut self, code: &[u8], address: u64) -> Option<Instruction> {
        let mut decoder = Decoder::with_ip(self.bitness, code, address, DecoderOptions::NONE);
        if !decoder.can_decode() {
            return None;
        }
        let instr = decoder.decode();
        if instr.is_invalid() {
            return None;
        }
        let len = instr.len();

        let mut mnemonic = String::new();
        self.formatter.format_mnemonic(&instr, &mut mnemonic);
        let mut op_str = String::new();
        self.formatter.format_all_operands(&instr, &mut op_str);

        // Formatter operand order can differ from instruction operand order
        let mut operands = Vec::new();
        for fo in 0..self.formatter.operand_count(&instr) {
            let mut text = String::new();
            if self.formatter.format_operand(&instr, &mut text, fo).is_err() {
                continue;
            }
            match self.formatter.get_instruction_operand(&instr, fo) {
                Ok(Some(op)) => operands.push(structured(&instr, op, text)),
                _ => operands.push(Operand::other(text)),
            }
        }

        Some(Instruction {
            address,
            bytes: code.get(..len)?.to_vec(),
            mnemonic,
            op_str,
            operands,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::OperandKind;

    #[test]
    fn decodes_xor_and_ret() {
        let mut d = IcedDecoder::new(Architecture::X86_64).unwrap();
        let code = [0x48, 0x31, 0xC0, 0xC3];
        let xor = d.decode(&code, 0x1000).unwrap();
        assert_eq!(xor.mnemonic, "xor");
        assert_eq!(xor.op_str, "rax, rax");
        assert_eq!(xor.len(), 3);
        assert_eq!(xor.operands.len(), 2);
        assert_eq!(xor.operands[0].register.as_deref(), Some("rax"));

        let ret = d.decode(&code[3..], 0x1003).unwrap();
        assert_eq!(ret.mnemonic, "ret");
        assert!(ret.operands.is_empty());
    }

    #[test]
    fn resolves_call_and_rip_relative_targets() {
        let mut d = IcedDecoder::new(Architecture::X86_64).unwrap();
        // call rel32 -> 0x1000 + 5 + 0x10
        let call = d.decode(&[0xE8, 0x10, 0x00, 0x00, 0x00], 0x1000).unwrap();
        assert_eq!(call.mnemonic, "call");
        assert_eq!(call.operands[0].target, Some(0x1015));
        assert!(call.op_str.contains("1015"));

        // lea rdi, [rip+0x20] at 0x2000 (7 bytes) -> 0x2027
        let lea = d
            .decode(&[0x48, 0x8D, 0x3D, 0x20, 0x00, 0x00, 0x00], 0x2000)
            .unwrap();
        assert_eq!(lea.mnemonic, "lea");
        let mem = &lea.operands[1];
        assert_eq!(mem.kind, OperandKind::Memory);
        assert_eq!(mem.target, Some(0x2027));
    }

    #[test]
    fn invalid_bytes_decode_to_none() {
        let mut d = IcedDecoder::new(Architecture::X86_64).unwrap();
        // 0x06 (push es) is invalid in 64-bit mode
        assert!(d.decode(&[0x06], 0).is_none());
        assert!(d.decode(&[], 0).is_none());
        assert!(IcedDecoder::new(Architecture::Arm64).is_none());
    }
}

//! Shared fixtures for integration tests.
//!
//! [`ElfBuilder`] writes small but well-formed ELF images: one LOAD segment
//! mapping `.text` at 0x1000 followed by `.rodata`, a static symbol table,
//! optional REL/RELA and DYNAMIC sections, and `.shstrtab` last.
#![allow(dead_code)]

pub const EM_386: u16 = 3;
pub const EM_ARM: u16 = 40;
pub const EM_X86_64: u16 = 62;
pub const EM_AARCH64: u16 = 183;

pub const TEXT_ADDR: u64 = 0x1000;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_RELA: u32 = 4;
const SHT_DYNAMIC: u32 = 6;
const SHT_REL: u32 = 9;

const SHF_WRITE: u64 = 0x1;
const SHF_ALLOC: u64 = 0x2;
const SHF_EXECINSTR: u64 = 0x4;

pub const STT_NOTYPE: u8 = 0;
pub const STT_OBJECT: u8 = 1;
pub const STT_FUNC: u8 = 2;
pub const STB_GLOBAL: u8 = 1;

#[derive(Debug, Clone)]
pub struct SymSpec {
    pub name: String,
    pub value: u64,
    pub size: u64,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
}

#[derive(Debug, Clone)]
pub struct RelocSpec {
    pub offset: u64,
    pub symbol: u32,
    pub r_type: u32,
    pub addend: i64,
}

#[derive(Debug, Clone)]
pub struct ElfBuilder {
    is64: bool,
    big_endian: bool,
    machine: u16,
    e_type: u16,
    entry: u64,
    text: Vec<u8>,
    rodata: Vec<u8>,
    symbols: Vec<SymSpec>,
    relocs: Vec<RelocSpec>,
    rela: bool,
    needed: Vec<String>,
}

#[derive(Default)]
struct Shdr {
    name: &'static str,
    ty: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

struct Out {
    buf: Vec<u8>,
    is64: bool,
    big_endian: bool,
}

impl Out {
    fn new(is64: bool, big_endian: bool) -> Self {
        Self {
            buf: Vec::new(),
            is64,
            big_endian,
        }
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u16(&mut self, v: u16) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    fn u32(&mut self, v: u32) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    fn u64(&mut self, v: u64) {
        let b = if self.big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
        self.buf.extend_from_slice(&b);
    }

    /// Address-sized field
    fn word(&mut self, v: u64) {
        if self.is64 {
            self.u64(v)
        } else {
            self.u32(v as u32)
        }
    }

    fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    fn align(&mut self, n: usize) {
        while self.buf.len() % n != 0 {
            self.buf.push(0);
        }
    }
}

fn align_up(v: u64, n: u64) -> u64 {
    v.div_ceil(n) * n
}

impl ElfBuilder {
    pub fn new(is64: bool, big_endian: bool, machine: u16) -> Self {
        Self {
            is64,
            big_endian,
            machine,
            e_type: 2,
            entry: TEXT_ADDR,
            text: Vec::new(),
            rodata: Vec::new(),
            symbols: Vec::new(),
            relocs: Vec::new(),
            rela: true,
            needed: Vec::new(),
        }
    }

    pub fn x86_64() -> Self {
        Self::new(true, false, EM_X86_64)
    }

    pub fn file_type(mut self, e_type: u16) -> Self {
        self.e_type = e_type;
        self
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    pub fn text(mut self, code: &[u8]) -> Self {
        self.text = code.to_vec();
        self
    }

    /// NUL-terminated strings packed into `.rodata`.
    pub fn rodata_strings(mut self, strings: &[&str]) -> Self {
        self.rodata.clear();
        for s in strings {
            self.rodata.extend_from_slice(s.as_bytes());
            self.rodata.push(0);
        }
        self
    }

    pub fn rodata(mut self, bytes: &[u8]) -> Self {
        self.rodata = bytes.to_vec();
        self
    }

    pub fn symbol(mut self, spec: SymSpec) -> Self {
        self.symbols.push(spec);
        self
    }

    /// Global FUNC in `.text`.
    pub fn func(self, name: &str, value: u64, size: u64) -> Self {
        self.symbol(SymSpec {
            name: name.to_string(),
            value,
            size,
            info: (STB_GLOBAL << 4) | STT_FUNC,
            other: 0,
            shndx: 1,
        })
    }

    /// Global OBJECT in `.rodata`.
    pub fn object(self, name: &str, value: u64, size: u64) -> Self {
        self.symbol(SymSpec {
            name: name.to_string(),
            value,
            size,
            info: (STB_GLOBAL << 4) | STT_OBJECT,
            other: 0,
            shndx: 2,
        })
    }

    /// Undefined global, i.e. an import.
    pub fn undefined(self, name: &str) -> Self {
        self.symbol(SymSpec {
            name: name.to_string(),
            value: 0,
            size: 0,
            info: (STB_GLOBAL << 4) | STT_NOTYPE,
            other: 0,
            shndx: 0,
        })
    }

    /// Relocation against symbol table index `symbol` (1 is the first added).
    pub fn reloc(mut self, offset: u64, symbol: u32, r_type: u32, addend: i64) -> Self {
        self.relocs.push(RelocSpec {
            offset,
            symbol,
            r_type,
            addend,
        });
        self
    }

    /// Emit `.rel.text` instead of `.rela.text`.
    pub fn use_rel(mut self) -> Self {
        self.rela = false;
        self
    }

    pub fn needed(mut self, lib: &str) -> Self {
        self.needed.push(lib.to_string());
        self
    }

    pub fn text_addr(&self) -> u64 {
        TEXT_ADDR
    }

    pub fn rodata_addr(&self) -> u64 {
        TEXT_ADDR + align_up(self.text.len() as u64, 16)
    }

    /// Virtual address of `needle` inside `.rodata`.
    pub fn rodata_addr_of(&self, needle: &str) -> Option<u64> {
        let n = needle.as_bytes();
        self.rodata
            .windows(n.len())
            .position(|w| w == n)
            .map(|p| self.rodata_addr() + p as u64)
    }

    fn sizes(&self) -> (u64, u64, u64) {
        if self.is64 {
            (64, 56, 64)
        } else {
            (52, 32, 40)
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let (ehsize, phentsize, shentsize) = self.sizes();
        let text_off = align_up(ehsize + phentsize, 16);
        let mut out = Out::new(self.is64, self.big_endian);
        out.buf.resize(text_off as usize, 0);

        let mut shdrs = vec![Shdr::default()];
        out.bytes(&self.text);
        shdrs.push(Shdr {
            name: ".text",
            ty: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            addr: TEXT_ADDR,
            offset: text_off,
            size: self.text.len() as u64,
            align: 16,
            ..Default::default()
        });
        out.align(16);
        let rodata_off = out.len();
        out.bytes(&self.rodata);
        shdrs.push(Shdr {
            name: ".rodata",
            ty: SHT_PROGBITS,
            flags: SHF_ALLOC,
            addr: self.rodata_addr(),
            offset: rodata_off,
            size: self.rodata.len() as u64,
            align: 1,
            ..Default::default()
        });
        let load_size = out.len() - text_off;

        let mut strtab = vec![0u8];
        let name_offsets: Vec<u32> = self
            .symbols
            .iter()
            .map(|s| {
                let off = strtab.len() as u32;
                strtab.extend_from_slice(s.name.as_bytes());
                strtab.push(0);
                off
            })
            .collect();

        out.align(8);
        let symtab_off = out.len();
        let null = SymSpec {
            name: String::new(),
            value: 0,
            size: 0,
            info: 0,
            other: 0,
            shndx: 0,
        };
        self.write_symbol(&mut out, 0, &null);
        for (s, &name) in self.symbols.iter().zip(&name_offsets) {
            self.write_symbol(&mut out, name, s);
        }
        let sym_size = if self.is64 { 24 } else { 16 };
        shdrs.push(Shdr {
            name: ".symtab",
            ty: SHT_SYMTAB,
            offset: symtab_off,
            size: out.len() - symtab_off,
            link: 4,
            info: 1,
            align: 8,
            entsize: sym_size,
            ..Default::default()
        });
        let strtab_off = out.len();
        out.bytes(&strtab);
        shdrs.push(Shdr {
            name: ".strtab",
            ty: SHT_STRTAB,
            offset: strtab_off,
            size: strtab.len() as u64,
            align: 1,
            ..Default::default()
        });

        if !self.relocs.is_empty() {
            out.align(8);
            let rel_off = out.len();
            for r in &self.relocs {
                out.word(r.offset);
                if self.is64 {
                    out.u64((u64::from(r.symbol) << 32) | u64::from(r.r_type));
                } else {
                    out.u32((r.symbol << 8) | (r.r_type & 0xff));
                }
                if self.rela {
                    if self.is64 {
                        out.u64(r.addend as u64);
                    } else {
                        out.u32(r.addend as i32 as u32);
                    }
                }
            }
            let entsize = match (self.is64, self.rela) {
                (true, true) => 24,
                (true, false) => 16,
                (false, true) => 12,
                (false, false) => 8,
            };
            shdrs.push(Shdr {
                name: if self.rela { ".rela.text" } else { ".rel.text" },
                ty: if self.rela { SHT_RELA } else { SHT_REL },
                offset: rel_off,
                size: out.len() - rel_off,
                link: 3,
                info: 1,
                align: 8,
                entsize,
                ..Default::default()
            });
        }

        if !self.needed.is_empty() {
            let mut dynstr = vec![0u8];
            let lib_offsets: Vec<u64> = self
                .needed
                .iter()
                .map(|lib| {
                    let off = dynstr.len() as u64;
                    dynstr.extend_from_slice(lib.as_bytes());
                    dynstr.push(0);
                    off
                })
                .collect();
            let dynstr_index = shdrs.len() as u32;
            let dynstr_off = out.len();
            out.bytes(&dynstr);
            shdrs.push(Shdr {
                name: ".dynstr",
                ty: SHT_STRTAB,
                offset: dynstr_off,
                size: dynstr.len() as u64,
                align: 1,
                ..Default::default()
            });
            out.align(8);
            let dyn_off = out.len();
            for off in lib_offsets {
                out.word(1); // DT_NEEDED
                out.word(off);
            }
            out.word(0); // DT_NULL
            out.word(0);
            shdrs.push(Shdr {
                name: ".dynamic",
                ty: SHT_DYNAMIC,
                flags: SHF_WRITE,
                offset: dyn_off,
                size: out.len() - dyn_off,
                link: dynstr_index,
                align: 8,
                entsize: if self.is64 { 16 } else { 8 },
                ..Default::default()
            });
        }

        shdrs.push(Shdr {
            name: ".shstrtab",
            ty: SHT_STRTAB,
            align: 1,
            ..Default::default()
        });
        let mut shstrtab = vec![0u8];
        let mut shnames = Vec::with_capacity(shdrs.len());
        for s in &shdrs {
            if s.name.is_empty() {
                shnames.push(0u32);
            } else {
                shnames.push(shstrtab.len() as u32);
                shstrtab.extend_from_slice(s.name.as_bytes());
                shstrtab.push(0);
            }
        }
        let shstrtab_off = out.len();
        out.bytes(&shstrtab);
        if let Some(last) = shdrs.last_mut() {
            last.offset = shstrtab_off;
            last.size = shstrtab.len() as u64;
        }

        out.align(8);
        let shoff = out.len();
        for (s, &name) in shdrs.iter().zip(&shnames) {
            out.u32(name);
            out.u32(s.ty);
            out.word(s.flags);
            out.word(s.addr);
            out.word(s.offset);
            out.word(s.size);
            out.u32(s.link);
            out.u32(s.info);
            out.word(s.align);
            out.word(s.entsize);
        }

        let mut head = Out::new(self.is64, self.big_endian);
        head.bytes(&[0x7f, b'E', b'L', b'F']);
        head.u8(if self.is64 { 2 } else { 1 });
        head.u8(if self.big_endian { 2 } else { 1 });
        head.u8(1);
        head.u8(0);
        head.buf.resize(16, 0);
        head.u16(self.e_type);
        head.u16(self.machine);
        head.u32(1);
        head.word(self.entry);
        head.word(ehsize); // phoff: right after the header
        head.word(shoff);
        head.u32(0);
        head.u16(ehsize as u16);
        head.u16(phentsize as u16);
        head.u16(1);
        head.u16(shentsize as u16);
        head.u16(shdrs.len() as u16);
        head.u16((shdrs.len() - 1) as u16);

        // PT_LOAD R+X over .text and .rodata
        head.u32(1);
        if self.is64 {
            head.u32(5);
        }
        head.word(text_off);
        head.word(TEXT_ADDR);
        head.word(TEXT_ADDR);
        head.word(load_size);
        head.word(load_size);
        if !self.is64 {
            head.u32(5);
        }
        head.word(0x1000);

        out.buf[..head.buf.len()].copy_from_slice(&head.buf);
        out.buf
    }

    fn write_symbol(&self, out: &mut Out, name: u32, s: &SymSpec) {
        if self.is64 {
            out.u32(name);
            out.u8(s.info);
            out.u8(s.other);
            out.u16(s.shndx);
            out.u64(s.value);
            out.u64(s.size);
        } else {
            out.u32(name);
            out.u32(s.value as u32);
            out.u32(s.size as u32);
            out.u8(s.info);
            out.u8(s.other);
            out.u16(s.shndx);
        }
    }
}

/// x86-64 image with `entry` at 0x1000 referencing the `license_ok` string.
///
/// `.text`: `lea rdi, [rip+disp]` (7 bytes) to the string, `call entry`,
/// `ret`.
pub fn license_fixture() -> (ElfBuilder, Vec<u8>) {
    let probe = ElfBuilder::x86_64().text(&[0u8; 16]).rodata_strings(&["license_ok"]);
    let string_addr = probe.rodata_addr_of("license_ok").unwrap_or_default();
    let disp = (string_addr - (TEXT_ADDR + 7)) as u32;
    let mut code = vec![0x48, 0x8d, 0x3d];
    code.extend_from_slice(&disp.to_le_bytes());
    // call rel32 back to 0x1000 from the end of this 5-byte call at 0x1007
    let rel = (TEXT_ADDR as i64 - (TEXT_ADDR as i64 + 12)) as i32;
    code.push(0xe8);
    code.extend_from_slice(&rel.to_le_bytes());
    code.push(0xc3);
    code.resize(16, 0x90);

    let builder = ElfBuilder::x86_64()
        .text(&code)
        .rodata_strings(&["license_ok"])
        .func("entry", TEXT_ADDR, 13)
        .object("license_msg", string_addr, 11)
        .undefined("puts")
        .reloc(TEXT_ADDR + 8, 3, 4, -4) // R_X86_64_PLT32 against puts
        .needed("libc.so.6");
    let bytes = builder.build();
    (builder, bytes)
}

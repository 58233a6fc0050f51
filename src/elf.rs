//! The shape an (out-of-scope) ELF parsing library hands the Loader.
//!
//! The ELF parsing library itself is kept outside core scope; this crate
//! only consumes its output. [`ElfImage`] is that output shape —
//! classification plus the segment table the Loader maps — grounded on the
//! `SEGMENT` struct in `global_defs.hpp` and the REL/EXEC/DYN/CORE
//! classification scheme it names.

use crate::types::{LinkageType, Segment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    Rel,
    Exec,
    Dyn,
    Core,
}

#[derive(Debug, Clone)]
pub struct ElfImage {
    pub class: ElfClass,
    pub linkage: LinkageType,
    pub entry: u64,
    pub phdr_off: u64,
    pub phent: u16,
    pub phnum: u16,
    pub segments: Vec<Segment>,
    pub interp: Option<String>,
    pub bytes_by_segment: Vec<Vec<u8>>,
}

impl ElfImage {
    pub fn is_position_independent(&self) -> bool {
        matches!(self.class, ElfClass::Dyn)
    }
}

#[cfg(test)]
pub fn fake_static_hello_world(arch_64: bool) -> ElfImage {
    let (load_addr, entry) = if arch_64 { (0x400000u64, 0x401000u64) } else { (0x8040000u64, 0x8041000u64) };
    ElfImage {
        class: ElfClass::Exec,
        linkage: LinkageType::Static,
        entry,
        phdr_off: 64,
        phent: 56,
        phnum: 1,
        segments: vec![Segment {
            virt_addr: load_addr,
            file_addr: 0,
            align: 0x1000,
            virt_sz: 0x1000,
            phy_sz: 0x1000,
            flags: 0b101, // R+X
        }],
        interp: None,
        bytes_by_segment: vec![vec![0u8; 0x1000]],
    }
}

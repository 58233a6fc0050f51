//! Baremetal emulation session configuration.
//!
//! Grounded on `include/arion/common/baremetal_manager.hpp`'s
//! `BaremetalManager`: configures a raw code buffer to execute without ELF
//! loading.

use crate::types::{Addr, CpuArch};

#[derive(Debug, Clone)]
pub struct BaremetalManager {
    arch: CpuArch,
    code: Vec<u8>,
    load_addr: Addr,
    entry_addr: Addr,
}

impl BaremetalManager {
    pub fn new(arch: CpuArch, code: Vec<u8>, load_addr: Addr, entry_addr: Addr) -> Self {
        Self {
            arch,
            code,
            load_addr,
            entry_addr,
        }
    }

    pub fn with_entry_at_load(arch: CpuArch, code: Vec<u8>, load_addr: Addr) -> Self {
        Self::new(arch, code, load_addr, load_addr)
    }

    pub fn empty(arch: CpuArch, load_addr: Addr, entry_addr: Addr) -> Self {
        Self::new(arch, Vec::new(), load_addr, entry_addr)
    }

    pub fn get_arch(&self) -> CpuArch {
        self.arch
    }

    pub fn get_code(&self) -> &[u8] {
        &self.code
    }

    pub fn get_load_addr(&self) -> Addr {
        self.load_addr
    }

    pub fn get_entry_addr(&self) -> Addr {
        self.entry_addr
    }
}

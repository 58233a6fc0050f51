//! The CPU emulator engine boundary.
//!
//! The underlying CPU emulation engine (Unicorn Engine, in practice) is kept
//! entirely outside this crate. This crate depends only on the [`CpuEngine`]
//! trait; a real build would plug in a binding to the actual engine, and
//! [`FakeCpuEngine`] stands in for it under test the way `MockPageAllocator`
//! (`nvm/src/memory.rs`) and `mock_cr3_read`/`mock_cr3_write` (`nvm/src/hal.rs`)
//! substitute minimal in-crate doubles for hardware the test environment does
//! not have.

use crate::types::{Addr, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineFault {
    UnmappedRead,
    UnmappedWrite,
    InvalidRegister,
    InvalidInstruction,
    Stopped,
}

pub type EngineResult<T> = Result<T, EngineFault>;

/// Minimal surface the core needs from a CPU emulator engine: raw register
/// access, raw memory access (mapping/permission tracking lives in
/// [`crate::memory::MemoryManager`], not here), and the run-for-N-cycles
/// primitive the scheduler drives.
pub trait CpuEngine: Send {
    fn mem_map(&mut self, addr: Addr, size: u64) -> EngineResult<()>;
    fn mem_unmap(&mut self, addr: Addr, size: u64) -> EngineResult<()>;
    fn mem_read(&self, addr: Addr, len: usize) -> EngineResult<Vec<u8>>;
    fn mem_write(&mut self, addr: Addr, bytes: &[u8]) -> EngineResult<()>;

    fn reg_read(&self, reg: Reg) -> EngineResult<u64>;
    fn reg_write(&mut self, reg: Reg, val: u64) -> EngineResult<()>;

    /// Runs until `max_cycles` instructions retire, a hook requests a stop,
    /// or a fault occurs. Returns the number of cycles actually executed.
    fn run(&mut self, start: Addr, max_cycles: u64) -> EngineResult<u64>;

    fn stop(&mut self);

    /// Duplicates this engine's full register and memory state for
    /// `fork(2)`, the way the underlying engine's own context-copy API would
    /// (Unicorn's `uc_context_save`/`uc_context_restore` into a fresh `uc_engine`).
    fn fork(&self) -> Box<dyn CpuEngine>;
}

/// An in-memory stand-in used by this crate's own tests. Backs memory with a
/// flat byte vector addressed by
/// offset from a base, which is enough to exercise the Memory Manager,
/// Loader, and Syscall Dispatcher without a real disassembler/interpreter.
pub struct FakeCpuEngine {
    pub regs: std::collections::HashMap<Reg, u64>,
    pub mem: std::collections::BTreeMap<Addr, u8>,
    pub stopped: bool,
}

impl Default for FakeCpuEngine {
    fn default() -> Self {
        Self {
            regs: Default::default(),
            mem: Default::default(),
            stopped: false,
        }
    }
}

impl CpuEngine for FakeCpuEngine {
    fn mem_map(&mut self, _addr: Addr, _size: u64) -> EngineResult<()> {
        Ok(())
    }

    fn mem_unmap(&mut self, addr: Addr, size: u64) -> EngineResult<()> {
        for a in addr..addr + size {
            self.mem.remove(&a);
        }
        Ok(())
    }

    fn mem_read(&self, addr: Addr, len: usize) -> EngineResult<Vec<u8>> {
        Ok((addr..addr + len as u64).map(|a| *self.mem.get(&a).unwrap_or(&0)).collect())
    }

    fn mem_write(&mut self, addr: Addr, bytes: &[u8]) -> EngineResult<()> {
        for (i, b) in bytes.iter().enumerate() {
            self.mem.insert(addr + i as u64, *b);
        }
        Ok(())
    }

    fn reg_read(&self, reg: Reg) -> EngineResult<u64> {
        Ok(*self.regs.get(&reg).unwrap_or(&0))
    }

    fn reg_write(&mut self, reg: Reg, val: u64) -> EngineResult<()> {
        self.regs.insert(reg, val);
        Ok(())
    }

    fn run(&mut self, _start: Addr, _max_cycles: u64) -> EngineResult<u64> {
        if self.stopped {
            return Err(EngineFault::Stopped);
        }
        Ok(0)
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn fork(&self) -> Box<dyn CpuEngine> {
        Box::new(FakeCpuEngine {
            regs: self.regs.clone(),
            mem: self.mem.clone(),
            stopped: self.stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_engine_round_trips_memory() {
        let mut e = FakeCpuEngine::default();
        e.mem_write(0x1000, b"hi").unwrap();
        assert_eq!(e.mem_read(0x1000, 2).unwrap(), b"hi");
    }

    #[test]
    fn fake_engine_round_trips_registers() {
        let mut e = FakeCpuEngine::default();
        e.reg_write(0, 0x42).unwrap();
        assert_eq!(e.reg_read(0).unwrap(), 0x42);
    }
}

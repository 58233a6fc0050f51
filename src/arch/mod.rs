//! Architecture/ABI adapter layer.
//!
//! One adapter per supported `(arch, mode)`, behind a single trait rather
//! than a multiple-inheritance mix of a per-arch class with a
//! `LinuxArchManager` (`include/arion/platforms/linux/lnx_arch_manager.hpp`)
//! bolted on. The `prstatus_to_regs` capability that header exists for
//! (core-dump thread parsing) is folded into [`ArchAdapter::prstatus_to_regs`]
//! instead of a separate interface.
//!
//! The register-table/event-hook-vocabulary shape is grounded on
//! `nvm/src/cpu.rs`'s `Registers`/`CpuState` (round-trippable GPR struct) and
//! `nvm/src/hal.rs`'s `tick()`/interrupt-routing: the adapter carries *data*
//! describing which interrupt number means syscall, rather than installing a
//! bespoke hook per architecture.

mod arm;
mod arm64;
mod ppc32;
mod x86;
mod x86_64;

pub use arm::ArchArm;
pub use arm64::ArchArm64;
pub use ppc32::ArchPpc32;
pub use x86::ArchX86;
pub use x86_64::ArchX8664;

use crate::engine::CpuEngine;
use crate::error::{ArchError, ArionResult};
use crate::types::{Addr, CpuArch, Reg};
use std::collections::HashMap;

/// Logical register names every adapter must resolve, independent of the
/// arch-specific raw register id the engine uses internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalReg {
    Pc,
    Sp,
    SyscallNo,
    SyscallArg(u8),
    SyscallReturn,
    Tls,
}

/// The per-arch ABI adapter. One implementation per `{X86, X8664, Arm, Arm64,
/// Ppc32} x {Linux}` pair.
pub trait ArchAdapter: Send {
    fn arch(&self) -> CpuArch;

    /// The interrupt number that denotes a syscall on this architecture
    /// (ARM: 0x2, x86: 0x80, x86-64: the `syscall` instruction, modeled here
    /// as a synthetic intno so the dispatcher stays interrupt-shaped).
    fn syscall_intno(&self) -> u32;

    fn resolve(&self, name: LogicalReg) -> Result<Reg, ArchError>;

    fn read_reg(&self, engine: &dyn CpuEngine, name: LogicalReg) -> ArionResult<u64> {
        let reg = self.resolve(name)?;
        engine
            .reg_read(reg)
            .map_err(|_| ArchError::EngineFault(format!("read {name:?}")).into())
    }

    fn write_reg(&self, engine: &mut dyn CpuEngine, name: LogicalReg, val: u64) -> ArionResult<()> {
        let reg = self.resolve(name)?;
        engine
            .reg_write(reg, val)
            .map_err(|_| ArchError::EngineFault(format!("write {name:?}")).into())
    }

    /// Installs the per-arch hook that routes `syscall_intno()` interrupts
    /// into the dispatcher. A no-op for the fake engine; a real engine binds
    /// an interrupt hook here.
    fn setup(&self, _engine: &mut dyn CpuEngine) -> ArionResult<()> {
        Ok(())
    }

    fn enable_vfp(&self, _engine: &mut dyn CpuEngine) -> ArionResult<()> {
        Ok(())
    }

    fn enable_lse(&self, _engine: &mut dyn CpuEngine) -> ArionResult<()> {
        Ok(())
    }

    /// Reads this arch's TLS base (CP15 TPIDRURO on ARM, FS_BASE on x86-64,
    /// the GDT slot on x86).
    fn tls_base(&self, engine: &dyn CpuEngine) -> ArionResult<u64> {
        self.read_reg(engine, LogicalReg::Tls)
    }

    fn set_tls_base(&self, engine: &mut dyn CpuEngine, base: u64) -> ArionResult<()> {
        self.write_reg(engine, LogicalReg::Tls, base)
    }

    /// Assembles a vsyscall trampoline for syscall number `n`. x86-64:
    /// `mov rax, n; syscall; ret`, INT3-padded to `len` bytes. Other
    /// architectures return an all-zero page.
    fn synth_vsyscall(&self, n: u64, len: usize) -> Vec<u8> {
        let _ = n;
        vec![0u8; len]
    }

    fn ptr_width(&self) -> usize {
        self.arch().ptr_width()
    }

    /// Parses an ELF core-dump `PRSTATUS` note's register blob into the
    /// logical register table (folds in `LinuxArchManager::prstatus_to_regs`).
    fn prstatus_to_regs(&self, prstatus: &[u8]) -> ArionResult<HashMap<LogicalReg, u64>>;
}

pub fn adapter_for(arch: CpuArch) -> Box<dyn ArchAdapter> {
    match arch {
        CpuArch::X86 => Box::new(ArchX86::default()),
        CpuArch::X8664 => Box::new(ArchX8664::default()),
        CpuArch::Arm => Box::new(ArchArm::default()),
        CpuArch::Arm64 => Box::new(ArchArm64::default()),
        CpuArch::Ppc32 => Box::new(ArchPpc32::default()),
    }
}

/// ARM's CPSR bit 5 (Thumb state) toggles which disassembler/assembler
/// sub-mode `curr_cs()`/`curr_ks()` should use.
pub const CPSR_THUMB_BIT: u32 = 1 << 5;

pub fn is_thumb(cpsr: u32) -> bool {
    cpsr & CPSR_THUMB_BIT != 0
}

/// The entry point reused by every adapter's `setup()` in a real engine
/// binding: a single interrupt hook, parametrized by `intno ==
/// adapter.syscall_intno()`, rather than one hook implementation per arch.
pub fn is_syscall_interrupt(adapter: &dyn ArchAdapter, intno: u32) -> bool {
    intno == adapter.syscall_intno()
}

use super::{ArchAdapter, LogicalReg};
use crate::error::ArchError;
use crate::types::{CpuArch, Reg};
use std::collections::HashMap;

// PowerPC syscall convention: r0 holds the syscall number, r3..r8 the args,
// r3 doubles as the return register (grounded on `src/archs/arch_ppc32.cpp`
// in the original — not excerpted locally, but the r0/r3-r8 convention is
// the well-known SysV PPC32 ABI and matches the header naming seen in
// `_INDEX.md` for the other three architectures).
pub const R0: Reg = 0;
pub const R3: Reg = 3;
pub const R4: Reg = 4;
pub const R5: Reg = 5;
pub const R6: Reg = 6;
pub const R7: Reg = 7;
pub const R8: Reg = 8;
pub const SP: Reg = 1;
pub const PC: Reg = 32;
pub const SPRG3_TLS: Reg = 33;

#[derive(Default)]
pub struct ArchPpc32;

impl ArchAdapter for ArchPpc32 {
    fn arch(&self) -> CpuArch {
        CpuArch::Ppc32
    }

    // The `sc` trap, modeled as a synthetic interrupt number distinct from
    // the other architectures' since PPC32 has no software-interrupt-number
    // operand the way x86/ARM do.
    fn syscall_intno(&self) -> u32 {
        0x1100
    }

    fn resolve(&self, name: LogicalReg) -> Result<Reg, ArchError> {
        Ok(match name {
            LogicalReg::Pc => PC,
            LogicalReg::Sp => SP,
            LogicalReg::SyscallNo => R0,
            LogicalReg::SyscallArg(0) => R3,
            LogicalReg::SyscallArg(1) => R4,
            LogicalReg::SyscallArg(2) => R5,
            LogicalReg::SyscallArg(3) => R6,
            LogicalReg::SyscallArg(4) => R7,
            LogicalReg::SyscallArg(5) => R8,
            LogicalReg::SyscallArg(n) => return Err(ArchError::UnknownRegister(format!("arg{n}"))),
            LogicalReg::SyscallReturn => R3,
            LogicalReg::Tls => SPRG3_TLS,
        })
    }

    fn prstatus_to_regs(&self, prstatus: &[u8]) -> crate::error::ArionResult<HashMap<LogicalReg, u64>> {
        let mut out = HashMap::new();
        let read_u32 = |off: usize| -> u64 {
            let mut b = [0u8; 4];
            if prstatus.len() >= off + 4 {
                b.copy_from_slice(&prstatus[off..off + 4]);
            }
            u32::from_le_bytes(b) as u64
        };
        out.insert(LogicalReg::Pc, read_u32(32 * 4));
        out.insert(LogicalReg::Sp, read_u32(1 * 4));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_register_is_r3() {
        assert_eq!(ArchPpc32::default().resolve(LogicalReg::SyscallReturn).unwrap(), R3);
    }
}

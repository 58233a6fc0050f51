use super::{ArchAdapter, LogicalReg};
use crate::error::ArchError;
use crate::types::{CpuArch, Reg};
use std::collections::HashMap;

pub const R0: Reg = 0;
pub const R1: Reg = 1;
pub const R2: Reg = 2;
pub const R3: Reg = 3;
pub const R4: Reg = 4;
pub const R5: Reg = 5;
pub const R7: Reg = 7;
pub const SP: Reg = 13;
pub const PC: Reg = 15;
pub const CP15_TPIDRURO: Reg = 16;

#[derive(Default)]
pub struct ArchArm;

impl ArchAdapter for ArchArm {
    fn arch(&self) -> CpuArch {
        CpuArch::Arm
    }

    fn syscall_intno(&self) -> u32 {
        0x2
    }

    fn resolve(&self, name: LogicalReg) -> Result<Reg, ArchError> {
        Ok(match name {
            LogicalReg::Pc => PC,
            LogicalReg::Sp => SP,
            LogicalReg::SyscallNo => R7,
            LogicalReg::SyscallArg(0) => R0,
            LogicalReg::SyscallArg(1) => R1,
            LogicalReg::SyscallArg(2) => R2,
            LogicalReg::SyscallArg(3) => R3,
            LogicalReg::SyscallArg(4) => R4,
            LogicalReg::SyscallArg(5) => R5,
            LogicalReg::SyscallArg(n) => return Err(ArchError::UnknownRegister(format!("arg{n}"))),
            LogicalReg::SyscallReturn => R0,
            LogicalReg::Tls => CP15_TPIDRURO,
        })
    }

    fn enable_vfp(&self, _engine: &mut dyn crate::engine::CpuEngine) -> crate::error::ArionResult<()> {
        // Real binding would set CPACR coprocessor access bits for cp10/cp11.
        Ok(())
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
        out.insert(LogicalReg::Pc, read_u32(15 * 4));
        out.insert(LogicalReg::Sp, read_u32(13 * 4));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_0x2_is_the_syscall_interrupt() {
        assert_eq!(ArchArm::default().syscall_intno(), 0x2);
    }
}

use super::{ArchAdapter, LogicalReg};
use crate::error::ArchError;
use crate::types::{CpuArch, Reg};
use std::collections::HashMap;

pub const X0: Reg = 0;
pub const X1: Reg = 1;
pub const X2: Reg = 2;
pub const X3: Reg = 3;
pub const X4: Reg = 4;
pub const X5: Reg = 5;
pub const X8: Reg = 8;
pub const SP: Reg = 31;
pub const PC: Reg = 32;
pub const TPIDR_EL0: Reg = 33;

#[derive(Default)]
pub struct ArchArm64;

impl ArchAdapter for ArchArm64 {
    fn arch(&self) -> CpuArch {
        CpuArch::Arm64
    }

    fn syscall_intno(&self) -> u32 {
        0x2
    }

    fn resolve(&self, name: LogicalReg) -> Result<Reg, ArchError> {
        Ok(match name {
            LogicalReg::Pc => PC,
            LogicalReg::Sp => SP,
            LogicalReg::SyscallNo => X8,
            LogicalReg::SyscallArg(0) => X0,
            LogicalReg::SyscallArg(1) => X1,
            LogicalReg::SyscallArg(2) => X2,
            LogicalReg::SyscallArg(3) => X3,
            LogicalReg::SyscallArg(4) => X4,
            LogicalReg::SyscallArg(5) => X5,
            LogicalReg::SyscallArg(n) => return Err(ArchError::UnknownRegister(format!("arg{n}"))),
            LogicalReg::SyscallReturn => X0,
            LogicalReg::Tls => TPIDR_EL0,
        })
    }

    fn enable_lse(&self, _engine: &mut dyn crate::engine::CpuEngine) -> crate::error::ArionResult<()> {
        Ok(())
    }

    fn prstatus_to_regs(&self, prstatus: &[u8]) -> crate::error::ArionResult<HashMap<LogicalReg, u64>> {
        let mut out = HashMap::new();
        let read_u64 = |off: usize| -> u64 {
            let mut b = [0u8; 8];
            if prstatus.len() >= off + 8 {
                b.copy_from_slice(&prstatus[off..off + 8]);
            }
            u64::from_le_bytes(b)
        };
        out.insert(LogicalReg::Pc, read_u64(32 * 8));
        out.insert(LogicalReg::Sp, read_u64(31 * 8));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syscall_no_register_is_x8() {
        assert_eq!(ArchArm64::default().resolve(LogicalReg::SyscallNo).unwrap(), X8);
    }
}

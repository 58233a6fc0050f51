use super::{ArchAdapter, LogicalReg};
use crate::error::ArchError;
use crate::types::{CpuArch, Reg};
use std::collections::HashMap;

// Raw register ids, arbitrary but stable — matches the ordering `read_gpr`/
// `write_gpr` use in `nvm/src/cpu.rs` (RAX=0 .. R15=15) extended with the
// handful of non-GPR slots the adapter needs.
pub const RAX: Reg = 0;
pub const RDI: Reg = 1;
pub const RSI: Reg = 2;
pub const RDX: Reg = 3;
pub const R10: Reg = 4;
pub const R8: Reg = 5;
pub const R9: Reg = 6;
pub const RSP: Reg = 7;
pub const RIP: Reg = 8;
pub const FS_BASE: Reg = 9;

#[derive(Default)]
pub struct ArchX8664;

impl ArchAdapter for ArchX8664 {
    fn arch(&self) -> CpuArch {
        CpuArch::X8664
    }

    // The real syscall entry is the `syscall` instruction, not a software
    // interrupt; modeled as a synthetic intno so the dispatcher's routing
    // stays interrupt-shaped for every arch uniformly.
    fn syscall_intno(&self) -> u32 {
        0x100
    }

    fn resolve(&self, name: LogicalReg) -> Result<Reg, ArchError> {
        Ok(match name {
            LogicalReg::Pc => RIP,
            LogicalReg::Sp => RSP,
            LogicalReg::SyscallNo => RAX,
            LogicalReg::SyscallArg(0) => RDI,
            LogicalReg::SyscallArg(1) => RSI,
            LogicalReg::SyscallArg(2) => RDX,
            LogicalReg::SyscallArg(3) => R10,
            LogicalReg::SyscallArg(4) => R8,
            LogicalReg::SyscallArg(5) => R9,
            LogicalReg::SyscallArg(n) => return Err(ArchError::UnknownRegister(format!("arg{n}"))),
            LogicalReg::SyscallReturn => RAX,
            LogicalReg::Tls => FS_BASE,
        })
    }

    fn synth_vsyscall(&self, n: u64, len: usize) -> Vec<u8> {
        // mov rax, imm64 ; syscall ; ret, INT3-padded.
        let mut buf = vec![0x48, 0xB8];
        buf.extend_from_slice(&n.to_le_bytes());
        buf.extend_from_slice(&[0x0F, 0x05, 0xC3]);
        buf.resize(len, 0xCC);
        buf
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
        // Linux x86-64 `user_regs_struct` layout order (see
        // `lnx_arch_x86-64.hpp`): ... rip at offset 16*8, rsp at 19*8.
        out.insert(LogicalReg::Pc, read_u64(16 * 8));
        out.insert(LogicalReg::Sp, read_u64(19 * 8));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vsyscall_encodes_mov_rax_syscall_ret() {
        let a = ArchX8664::default();
        let buf = a.synth_vsyscall(60, 16);
        assert_eq!(&buf[0..2], &[0x48, 0xB8]);
        assert_eq!(&buf[10..13], &[0x0F, 0x05, 0xC3]);
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn syscall_args_resolve_to_linux_abi_registers() {
        let a = ArchX8664::default();
        assert_eq!(a.resolve(LogicalReg::SyscallNo).unwrap(), RAX);
        assert_eq!(a.resolve(LogicalReg::SyscallArg(0)).unwrap(), RDI);
        assert_eq!(a.resolve(LogicalReg::SyscallArg(3)).unwrap(), R10);
    }
}

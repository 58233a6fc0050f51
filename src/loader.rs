//! Linux process loader: ELF segment mapping, interpreter resolution, and
//! stack/auxv/argv/envp layout.
//!
//! Grounded on `include/arion/platforms/linux/lnx_loader.hpp`'s
//! `LinuxLoader`/`LNX_LOADER_PARAMS`/`AUXV`. The two concrete variants are
//! `LinuxElfLoader` (program-argument path) and `LinuxBaremetalLoader`
//! (raw-code path), exactly as named there.

use crate::arch::{ArchAdapter, LogicalReg};
use crate::baremetal::BaremetalManager;
use crate::elf::ElfImage;
use crate::engine::CpuEngine;
use crate::error::{ArionResult, LoaderError};
use crate::memory::{MemoryManager, Perms};
use crate::types::{Addr, CpuArch};
use rand::RngCore;

pub const LINUX_64_LOAD_ADDR: Addr = 0x400000;
pub const LINUX_64_STACK_ADDR: Addr = 0x7ffffffde000;
pub const LINUX_64_STACK_SZ: u64 = 0x21000;

pub const LINUX_32_LOAD_ADDR: Addr = 0x8040000;
pub const LINUX_32_STACK_ADDR: Addr = 0xfffcf000;
pub const LINUX_32_STACK_SZ: u64 = 0x21000;

pub const VSYSCALL_ADDR: Addr = 0xFFFFFFFFFF600000;
pub const ARM_TRAPS_ADDR: Addr = 0xFFFF0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Auxv {
    Null = 0,
    Phdr = 3,
    Phent = 4,
    Phnum = 5,
    Pagesz = 6,
    Base = 7,
    Flags = 8,
    Entry = 9,
    Uid = 11,
    Euid = 12,
    Gid = 13,
    Egid = 14,
    Platform = 15,
    Hwcap = 16,
    Clktck = 17,
    Secure = 23,
    Random = 25,
    Execfn = 31,
    SysinfoEhdr = 33,
}

#[derive(Debug, Clone, Default)]
pub struct LoaderParams {
    pub load_addr: Addr,
    pub interp_addr: Addr,
    pub vvar_addr: Addr,
    pub vdso_addr: Addr,
    pub stack_addr: Addr,
    pub vsyscall_addr: Addr,
    pub arm_traps_addr: Addr,
    pub entry_addr: Addr,
}

/// Intermediate result of laying out the guest stack image, before argv/envp
/// pointer arrays and auxv are written (those need `sp`, which depends on
/// how many pointers there are).
struct StackStrings {
    sp: Addr,
    random_addr: Addr,
    prog_name_addr: Addr,
    platform_name_addr: Addr,
    argv_addrs: Vec<Addr>,
    envp_addrs: Vec<Addr>,
}

/// Writes AT_RANDOM bytes, the platform name, the program name, and every
/// argv/envp string, growing down from the top of the stack region. Mirrors
/// `LinuxLoader::map_stack` plus the string-writing half of
/// `setup_argv`/`setup_envp`.
fn map_stack(
    mem: &mut MemoryManager,
    engine: &mut dyn CpuEngine,
    adapter: &dyn ArchAdapter,
    program_args: &[String],
    program_env: &[String],
) -> ArionResult<StackStrings> {
    let (stack_addr, stack_sz) = if adapter.arch().is_64_bit() {
        (LINUX_64_STACK_ADDR, LINUX_64_STACK_SZ)
    } else {
        (LINUX_32_STACK_ADDR, LINUX_32_STACK_SZ)
    };
    mem.map(stack_addr, stack_sz, Perms::RW, "[stack]")?;

    let mut cursor = stack_addr + stack_sz;

    let mut random_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut random_bytes);
    cursor -= 16;
    let random_addr = cursor;
    mem.write(engine, random_addr, &random_bytes)?;

    let platform_name = adapter.arch().name();
    cursor -= (platform_name.len() + 1) as u64;
    let platform_name_addr = cursor;
    mem.write_string(engine, platform_name_addr, platform_name)?;

    let prog_name = program_args.first().map(String::as_str).unwrap_or("a.out");
    cursor -= (prog_name.len() + 1) as u64;
    let prog_name_addr = cursor;
    mem.write_string(engine, prog_name_addr, prog_name)?;

    let mut envp_addrs = Vec::with_capacity(program_env.len());
    for e in program_env.iter().rev() {
        cursor -= (e.len() + 1) as u64;
        mem.write_string(engine, cursor, e)?;
        envp_addrs.push(cursor);
    }
    envp_addrs.reverse();

    let mut argv_addrs = Vec::with_capacity(program_args.len());
    for a in program_args.iter().rev() {
        cursor -= (a.len() + 1) as u64;
        mem.write_string(engine, cursor, a)?;
        argv_addrs.push(cursor);
    }
    argv_addrs.reverse();

    let pw = adapter.ptr_width() as u64;
    cursor &= !(pw - 1);

    Ok(StackStrings {
        sp: cursor,
        random_addr,
        prog_name_addr,
        platform_name_addr,
        argv_addrs,
        envp_addrs,
    })
}

/// Writes argc, argv[], NULL, envp[], NULL below `strings.sp`, growing down,
/// and returns the stack pointer that ends up pointing at argc. Mirrors
/// `setup_argv`/`setup_envp`'s pointer-array half.
fn write_argv_envp(mem: &mut MemoryManager, engine: &mut dyn CpuEngine, ptr_width: usize, strings: &StackStrings) -> ArionResult<Addr> {
    let pw = ptr_width as u64;
    let n_words = 1 + strings.argv_addrs.len() + 1 + strings.envp_addrs.len() + 1;
    let sp = strings.sp - (n_words as u64) * pw;
    let mut cursor = sp;

    mem.write_val(engine, cursor, strings.argv_addrs.len() as u64, ptr_width)?;
    cursor += pw;
    for &a in &strings.argv_addrs {
        mem.write_val(engine, cursor, a, ptr_width)?;
        cursor += pw;
    }
    mem.write_val(engine, cursor, 0, ptr_width)?;
    cursor += pw;
    for &e in &strings.envp_addrs {
        mem.write_val(engine, cursor, e, ptr_width)?;
        cursor += pw;
    }
    mem.write_val(engine, cursor, 0, ptr_width)?;

    Ok(sp)
}

/// Writes the AT_* auxv table right below the argv/envp arrays, then sets PC
/// and SP to their final values. Shared tail of both loader variants.
#[allow(clippy::too_many_arguments)]
fn finish_stack(
    mem: &mut MemoryManager,
    engine: &mut dyn CpuEngine,
    adapter: &dyn ArchAdapter,
    params: &LoaderParams,
    phdr_off: u64,
    phent: u16,
    phnum: u16,
    strings: &StackStrings,
) -> ArionResult<()> {
    let pw = adapter.ptr_width();
    let final_sp = write_argv_envp(mem, engine, pw, strings)?;

    let auxv_entries: [(Auxv, u64); 17] = [
        (Auxv::Phdr, params.load_addr + phdr_off),
        (Auxv::Phent, phent as u64),
        (Auxv::Phnum, phnum as u64),
        (Auxv::Pagesz, crate::types::ARION_SYSTEM_PAGE_SZ),
        (Auxv::Base, params.interp_addr),
        (Auxv::Flags, 0),
        (Auxv::Entry, params.entry_addr),
        (Auxv::Uid, 0),
        (Auxv::Euid, 0),
        (Auxv::Gid, 0),
        (Auxv::Egid, 0),
        (Auxv::Secure, 0),
        (Auxv::Random, strings.random_addr),
        (Auxv::Hwcap, 0),
        (Auxv::Clktck, 100),
        (Auxv::Platform, strings.platform_name_addr),
        (Auxv::Execfn, strings.prog_name_addr),
    ];

    let pw64 = pw as u64;
    let mut auxv_addr = final_sp - ((auxv_entries.len() as u64 + 2) * 2 * pw64);
    for (key, val) in auxv_entries.iter().chain([&(Auxv::SysinfoEhdr, params.vdso_addr)]) {
        mem.write_val(engine, auxv_addr, *key as u64, pw)?;
        auxv_addr += pw64;
        mem.write_val(engine, auxv_addr, *val, pw)?;
        auxv_addr += pw64;
    }
    mem.write_val(engine, auxv_addr, Auxv::Null as u64, pw)?;
    auxv_addr += pw64;
    mem.write_val(engine, auxv_addr, 0, pw)?;

    adapter.write_reg(engine, LogicalReg::Sp, final_sp)?;
    adapter.write_reg(engine, LogicalReg::Pc, params.entry_addr)?;
    Ok(())
}

pub trait LinuxLoader {
    fn process(&self, mem: &mut MemoryManager, engine: &mut dyn CpuEngine, adapter: &dyn ArchAdapter) -> ArionResult<LoaderParams>;
}

pub struct LinuxElfLoader {
    pub program_args: Vec<String>,
    pub program_env: Vec<String>,
    pub image: ElfImage,
}

impl LinuxElfLoader {
    pub fn new(program_args: Vec<String>, program_env: Vec<String>, image: ElfImage) -> Self {
        Self { program_args, program_env, image }
    }

    fn base_addr(&self, adapter: &dyn ArchAdapter) -> Addr {
        if self.image.is_position_independent() {
            if adapter.arch().is_64_bit() {
                LINUX_64_LOAD_ADDR
            } else {
                LINUX_32_LOAD_ADDR
            }
        } else {
            0
        }
    }
}

impl LinuxLoader for LinuxElfLoader {
    fn process(&self, mem: &mut MemoryManager, engine: &mut dyn CpuEngine, adapter: &dyn ArchAdapter) -> ArionResult<LoaderParams> {
        if self.image.segments.is_empty() {
            return Err(LoaderError::MalformedElf("no PT_LOAD segments".into()).into());
        }
        let base = self.base_addr(adapter);

        for (seg, bytes) in self.image.segments.iter().zip(self.image.bytes_by_segment.iter()) {
            let mut perms = Perms::empty();
            if seg.flags & 0b100 != 0 {
                perms |= Perms::R;
            }
            if seg.flags & 0b010 != 0 {
                perms |= Perms::W;
            }
            if seg.flags & 0b001 != 0 {
                perms |= Perms::X;
            }
            let addr = mem.map(base + seg.virt_addr, seg.virt_sz.max(seg.phy_sz), perms, "[load]")?;
            if !bytes.is_empty() {
                mem.write(engine, addr, bytes)?;
            }
        }

        let interp_addr = if self.image.interp.is_some() {
            // A real interpreter image would be parsed and mapped the same
            // way as the main image at a higher base; interpreter resolution
            // itself goes through the out-of-scope ELF parser, so this slot
            // is reserved but left empty.
            let higher = base + 0x1000_0000;
            mem.map(higher, 0x1000, Perms::RX, "[interp]")?
        } else {
            0
        };

        let vvar_addr = mem.map(0, 0x3000, Perms::R, "[vvar]")?;
        let vdso_addr = mem.map(0, 0x1000, Perms::RX, "[vdso]")?;

        let vsyscall_addr = if adapter.arch() == CpuArch::X8664 {
            let vsys = mem.map(VSYSCALL_ADDR, 0x1000, Perms::RX, "[vsyscall]")?;
            let code = adapter.synth_vsyscall(60, 0x1000);
            mem.write(engine, vsys, &code)?;
            vsys
        } else {
            0
        };

        let arm_traps_addr = if adapter.arch() == CpuArch::Arm {
            mem.map(ARM_TRAPS_ADDR, 0x1000, Perms::RX, "[arm_traps]")?
        } else {
            0
        };

        let strings = map_stack(mem, engine, adapter, &self.program_args, &self.program_env)?;
        let entry = if interp_addr != 0 { interp_addr } else { base + self.image.entry };

        let params = LoaderParams {
            load_addr: base,
            interp_addr,
            vvar_addr,
            vdso_addr,
            stack_addr: if adapter.arch().is_64_bit() { LINUX_64_STACK_ADDR } else { LINUX_32_STACK_ADDR },
            vsyscall_addr,
            arm_traps_addr,
            entry_addr: entry,
        };

        finish_stack(mem, engine, adapter, &params, self.image.phdr_off, self.image.phent, self.image.phnum, &strings)?;
        Ok(params)
    }
}

pub struct LinuxBaremetalLoader {
    pub program_args: Vec<String>,
    pub program_env: Vec<String>,
    pub manager: BaremetalManager,
}

impl LinuxBaremetalLoader {
    pub fn new(program_args: Vec<String>, program_env: Vec<String>, manager: BaremetalManager) -> Self {
        Self { program_args, program_env, manager }
    }
}

impl LinuxLoader for LinuxBaremetalLoader {
    fn process(&self, mem: &mut MemoryManager, engine: &mut dyn CpuEngine, adapter: &dyn ArchAdapter) -> ArionResult<LoaderParams> {
        let load_addr = self.manager.get_load_addr();
        let code = self.manager.get_code();
        let size = ((code.len() as u64).max(1) + 0xFFF) & !0xFFF;
        let mapped = mem.map(load_addr, size, Perms::RWX, "[baremetal]")?;
        if !code.is_empty() {
            mem.write(engine, mapped, code)?;
        }

        let strings = map_stack(mem, engine, adapter, &self.program_args, &self.program_env)?;

        let params = LoaderParams {
            load_addr: mapped,
            interp_addr: 0,
            vvar_addr: 0,
            vdso_addr: 0,
            stack_addr: if adapter.arch().is_64_bit() { LINUX_64_STACK_ADDR } else { LINUX_32_STACK_ADDR },
            vsyscall_addr: 0,
            arm_traps_addr: 0,
            entry_addr: self.manager.get_entry_addr(),
        };

        finish_stack(mem, engine, adapter, &params, 0, 0, 0, &strings)?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::adapter_for;
    use crate::elf::fake_static_hello_world;
    use crate::engine::FakeCpuEngine;

    #[test]
    fn elf_loader_maps_stack_vdso_vvar_vsyscall() {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let image = fake_static_hello_world(true);
        let loader = LinuxElfLoader::new(vec!["/bin/prog".into()], vec!["PATH=/bin".into()], image);
        loader.process(&mut mem, &mut engine, adapter.as_ref()).unwrap();

        let labels: Vec<&str> = mem.get_mappings().iter().map(|m| m.label.as_str()).collect();
        assert!(labels.contains(&"[stack]"));
        assert!(labels.contains(&"[vvar]"));
        assert!(labels.contains(&"[vdso]"));
        assert!(labels.contains(&"[vsyscall]"));
        assert!(labels.contains(&"[load]"));
    }

    #[test]
    fn baremetal_loader_maps_rwx_at_requested_address() {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let mgr = BaremetalManager::with_entry_at_load(CpuArch::X8664, vec![0x90, 0xC3], 0x400000);
        let loader = LinuxBaremetalLoader::new(vec![], vec![], mgr);
        let params = loader.process(&mut mem, &mut engine, adapter.as_ref()).unwrap();
        assert_eq!(params.entry_addr, 0x400000);
        assert!(mem.is_mapped(0x400000));
    }

    #[test]
    fn final_sp_points_at_argc() {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let mgr = BaremetalManager::with_entry_at_load(CpuArch::X8664, vec![0x90], 0x400000);
        let loader = LinuxBaremetalLoader::new(vec!["a".into(), "b".into()], vec![], mgr);
        loader.process(&mut mem, &mut engine, adapter.as_ref()).unwrap();
        let sp = adapter.read_reg(&engine, LogicalReg::Sp).unwrap();
        let argc = mem.read_val(&engine, sp, 8).unwrap();
        assert_eq!(argc, 2);
    }

    #[test]
    fn entry_without_interp_is_load_addr_plus_elf_entry() {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let image = fake_static_hello_world(true);
        let expected_entry = image.entry;
        let loader = LinuxElfLoader::new(vec![], vec![], image);
        let params = loader.process(&mut mem, &mut engine, adapter.as_ref()).unwrap();
        assert_eq!(params.entry_addr, expected_entry);
    }
}

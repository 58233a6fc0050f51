//! Memory-mapping syscalls: `mmap`, `munmap`, `mprotect`, `brk`.
//!
//! Grounded on `include/arion/common/memory_manager.hpp`'s mmap-family
//! wrappers over `MemoryManager::map`/`unmap`/`protect`.

use super::SyscallContext;
use crate::memory::Perms;

const ENOMEM: i64 = -12;
const EINVAL: i64 = -22;

fn prot_to_perms(prot: u64) -> Perms {
    let mut perms = Perms::empty();
    if prot & libc::PROT_READ as u64 != 0 {
        perms |= Perms::R;
    }
    if prot & libc::PROT_WRITE as u64 != 0 {
        perms |= Perms::W;
    }
    if prot & libc::PROT_EXEC as u64 != 0 {
        perms |= Perms::X;
    }
    perms
}

pub fn mmap(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (addr_hint, len, prot) = (args[0], args[1], args[2]);
    if len == 0 {
        return EINVAL;
    }
    match ctx.mem.map(addr_hint, len, prot_to_perms(prot), "[anon]") {
        Ok(addr) => addr as i64,
        Err(_) => ENOMEM,
    }
}

/// `mmap2`: identical to `mmap` except the file offset (args[5]) is counted
/// in pages rather than bytes; this crate's `map` never backs a mapping by a
/// host file descriptor, so the offset is irrelevant past normalizing it.
pub fn mmap2(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    const PAGE_SHIFT: u64 = 12;
    let mut normalized = args;
    normalized[5] <<= PAGE_SHIFT;
    mmap(ctx, normalized)
}

pub fn munmap(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (addr, len) = (args[0], args[1]);
    match ctx.mem.unmap(addr, len) {
        Ok(()) => 0,
        Err(_) => EINVAL,
    }
}

pub fn mprotect(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (addr, len, prot) = (args[0], args[1], args[2]);
    match ctx.mem.protect(addr, len, prot_to_perms(prot)) {
        Ok(()) => 0,
        Err(_) => EINVAL,
    }
}

/// `brk(addr)`: this crate tracks the heap as an ordinary labeled mapping
/// rather than a dedicated field, so growing it means re-mapping `[heap]`
/// larger. Passing `0` queries the current break.
pub fn brk(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let requested = args[0];
    const HEAP_BASE: u64 = 0x0000_5555_0000_0000;
    let current_end = ctx
        .mem
        .get_mappings()
        .iter()
        .find(|m| m.label == "[heap]")
        .map(|m| m.end)
        .unwrap_or(HEAP_BASE);

    if requested == 0 {
        return current_end as i64;
    }
    if requested <= current_end {
        return current_end as i64;
    }
    let grow_by = requested - current_end;
    match ctx.mem.map(current_end, grow_by, Perms::RW, "[heap]") {
        Ok(_) => requested as i64,
        Err(_) => ENOMEM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::adapter_for;
    use crate::config::Config;
    use crate::engine::FakeCpuEngine;
    use crate::fs::FileSystemManager;
    use crate::hooks::HooksEngine;
    use crate::logger::Logger;
    use crate::memory::MemoryManager;
    use crate::scheduler::ThreadScheduler;
    use crate::signal::SignalManager;
    use crate::socket::SocketManager;
    use crate::types::CpuArch;

    fn with_ctx<F: FnOnce(&mut SyscallContext) -> i64>(f: F) -> i64 {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let mut fs = FileSystemManager::initialize("/tmp/arion-root", "/");
        let mut sockets = SocketManager::initialize();
        let mut signals = SignalManager::initialize();
        let mut scheduler = ThreadScheduler::new();
        let tid = scheduler.spawn_main_thread();
        let mut hooks = HooksEngine::new();
        let logger = Logger::new(tid, crate::config::LogLevel::Off);
        let config = Config::default();
        let mut ctx = SyscallContext {
            mem: &mut mem,
            engine: &mut engine,
            adapter: adapter.as_ref(),
            fs: &mut fs,
            sockets: &mut sockets,
            signals: &mut signals,
            scheduler: &mut scheduler,
            hooks: &mut hooks,
            logger: &logger,
            config: &config,
            tid,
        };
        f(&mut ctx)
    }

    #[test]
    fn mmap_then_munmap_unmaps_the_region() {
        let addr = with_ctx(|ctx| mmap(ctx, [0, 0x1000, libc::PROT_READ as u64, 0, 0, 0]));
        assert!(addr > 0);
        let unmapped = with_ctx(|ctx| {
            ctx.mem.map(addr as u64, 0x1000, Perms::R, "x").unwrap();
            munmap(ctx, [addr as u64, 0x1000, 0, 0, 0, 0])
        });
        assert_eq!(unmapped, 0);
    }

    #[test]
    fn brk_grows_monotonically() {
        let first = with_ctx(|ctx| brk(ctx, [0x0000_5555_0000_1000, 0, 0, 0, 0, 0]));
        assert_eq!(first, 0x0000_5555_0000_1000);
    }

    #[test]
    fn mmap2_maps_like_mmap() {
        let addr = with_ctx(|ctx| mmap2(ctx, [0, 0x1000, libc::PROT_READ as u64, 0, 0, 0]));
        assert!(addr > 0);
    }

    #[test]
    fn zero_length_mmap_is_einval() {
        let ret = with_ctx(|ctx| mmap(ctx, [0, 0, 0, 0, 0, 0]));
        assert_eq!(ret, EINVAL);
    }
}

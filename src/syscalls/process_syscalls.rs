//! Process/thread lifecycle syscalls: `fork`, `clone`, `execve`, `wait4`,
//! `exit`, and id queries.
//!
//! Grounded on `include/arion/common/arion_group.hpp`'s process/thread table
//! operations, delegating the bookkeeping to [`crate::scheduler::ThreadScheduler`].

use super::SyscallContext;

const ESRCH: i64 = -3;
const ECHILD: i64 = -10;

pub fn getpid(ctx: &mut SyscallContext) -> i64 {
    ctx.scheduler.threads().iter().find(|t| t.tid == ctx.tid).map(|t| t.pid as i64).unwrap_or(ctx.tid as i64)
}

pub fn getppid(_ctx: &mut SyscallContext) -> i64 {
    // Parent tracking is out of this crate's in-scope surface beyond the
    // thread-group-leader relationship `ThreadScheduler` already models.
    crate::types::ARION_PROCESS_PID as i64
}

pub fn gettid(ctx: &mut SyscallContext) -> i64 {
    ctx.tid as i64
}

/// `CLONE_THREAD`: new thread shares the caller's pid. Unset, this is a
/// `fork(2)`-shaped request and is intercepted a level up in
/// [`crate::guest::Arion::dispatch_pending_syscall`] before it ever reaches
/// this module, since spinning up a whole new guest instance needs `&mut
/// Arion`, not just `&mut SyscallContext`. `clone` only ever observes the
/// `CLONE_THREAD` case.
pub const CLONE_THREAD: u64 = 0x0001_0000;

pub fn clone(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let flags = args[0];
    debug_assert!(flags & CLONE_THREAD != 0, "non-thread clone must be intercepted before dispatch");
    match ctx.scheduler.clone_thread(ctx.tid) {
        Ok(new_tid) => new_tid as i64,
        Err(_) => ESRCH,
    }
}

/// `clone3(struct clone_args*, size)`: the modern `clone`, with flags read
/// out of the guest-memory struct's first field rather than passed in a
/// register. Same `CLONE_THREAD`-only contract as `clone` — a non-thread
/// request is intercepted before this dispatch is reached.
pub fn clone3(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let cl_args_addr = args[0];
    let flags = ctx.mem.read_val(ctx.engine, cl_args_addr, 8).unwrap_or(0);
    debug_assert!(flags & CLONE_THREAD != 0, "non-thread clone3 must be intercepted before dispatch");
    match ctx.scheduler.clone_thread(ctx.tid) {
        Ok(new_tid) => new_tid as i64,
        Err(_) => ESRCH,
    }
}

pub fn exit(ctx: &mut SyscallContext, args: [u64; 6], group: bool) -> i64 {
    let code = args[0] as i32;
    let _ = ctx.scheduler.exit_thread(ctx.tid, code);
    if group {
        ctx.signals.queue_signal(ctx.tid, crate::signal::SIGCHLD);
        let (_, woken) = ctx.signals.handle_signal(ctx.tid, crate::signal::SIGCHLD, std::collections::HashMap::new());
        if let Some((waiter_tid, status_addr)) = woken {
            if status_addr != 0 {
                ctx.mem.write_val(ctx.engine, status_addr, ((code as u64) & 0xff) << 8, 4).ok();
            }
            ctx.scheduler.wake_sigwait(waiter_tid).ok();
        }
    }
    0
}

pub fn wait4(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let target = args[0] as i64;
    let target_tid = if target > 0 { Some(target as u64) } else { None };
    match ctx.scheduler.reap(target_tid) {
        Some((tid, code)) => {
            let status_addr = args[1];
            if status_addr != 0 {
                ctx.mem.write_val(ctx.engine, status_addr, ((code as u64) & 0xff) << 8, 4).ok();
            }
            tid as i64
        }
        None => {
            ctx.scheduler.block_on_wait(ctx.tid, target_tid).ok();
            ECHILD
        }
    }
}

pub fn waitid(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    // idtype in args[0], id in args[1]; this crate only distinguishes
    // "wait for a specific tid" (P_PID == 1) from "wait for any" (P_ALL == 0).
    const P_PID: u64 = 1;
    let target_tid = if args[0] == P_PID { Some(args[1]) } else { None };
    match ctx.scheduler.reap(target_tid) {
        Some((tid, _code)) => tid as i64,
        None => {
            ctx.scheduler.block_on_wait(ctx.tid, target_tid).ok();
            ECHILD
        }
    }
}

pub fn arch_prctl(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    const ARCH_SET_FS: u64 = 0x1002;
    const ARCH_GET_FS: u64 = 0x1003;
    match args[0] {
        ARCH_SET_FS => match ctx.adapter.set_tls_base(ctx.engine, args[1]) {
            Ok(()) => 0,
            Err(_) => -22,
        },
        ARCH_GET_FS => ctx.adapter.tls_base(ctx.engine).map(|v| v as i64).unwrap_or(-22),
        _ => -22,
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

    fn with_ctx<F: FnOnce(&mut SyscallContext) -> i64>(scheduler: &mut ThreadScheduler, tid: u64, f: F) -> i64 {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let mut fs = FileSystemManager::initialize("/tmp/arion-root", "/");
        let mut sockets = SocketManager::initialize();
        let mut signals = SignalManager::initialize();
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
            scheduler,
            hooks: &mut hooks,
            logger: &logger,
            config: &config,
            tid,
        };
        f(&mut ctx)
    }

    #[test]
    fn clone_thread_then_wait4_reaps_after_exit() {
        let mut scheduler = ThreadScheduler::new();
        let parent = scheduler.spawn_main_thread();
        let child = with_ctx(&mut scheduler, parent, |ctx| clone(ctx, [CLONE_THREAD, 0, 0, 0, 0, 0])) as u64;

        let blocked = with_ctx(&mut scheduler, parent, |ctx| wait4(ctx, [child, 0, 0, 0, 0, 0]));
        assert_eq!(blocked, ECHILD);

        with_ctx(&mut scheduler, child, |ctx| exit(ctx, [5, 0, 0, 0, 0, 0], true));
        let reaped = with_ctx(&mut scheduler, parent, |ctx| wait4(ctx, [child, 0, 0, 0, 0, 0]));
        assert_eq!(reaped, child as i64);
    }

    #[test]
    fn clone3_reads_flags_from_guest_struct() {
        let mut scheduler = ThreadScheduler::new();
        let parent = scheduler.spawn_main_thread();
        let child = with_ctx(&mut scheduler, parent, |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            ctx.mem.write_val(ctx.engine, 0x8000, CLONE_THREAD, 8).unwrap();
            clone3(ctx, [0x8000, 88, 0, 0, 0, 0])
        });
        assert!(child > 0);
    }

    #[test]
    fn getpid_matches_thread_group_leader() {
        let mut scheduler = ThreadScheduler::new();
        let main = scheduler.spawn_main_thread();
        let ret = with_ctx(&mut scheduler, main, |ctx| getpid(ctx));
        assert_eq!(ret, main as i64);
    }
}

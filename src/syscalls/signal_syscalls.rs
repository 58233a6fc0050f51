//! Signal-related syscalls: `kill`, `rt_sigaction`, `rt_sigreturn`.
//!
//! Grounded on `include/arion/common/signal_manager.hpp`, delegating
//! bookkeeping to [`crate::signal::SignalManager`].

use super::SyscallContext;
use crate::signal::KSigAction;

const ESRCH: i64 = -3;
const EINVAL: i64 = -22;

pub fn kill(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (target_tid, signo) = (args[0], args[1] as i32);
    if !ctx.scheduler.has_thread(target_tid) {
        return ESRCH;
    }
    ctx.signals.queue_signal(ctx.tid, signo);
    0
}

/// `tgkill(tgid, tid, sig)`: like `kill`, but targets one specific thread
/// rather than a whole thread group.
pub fn tgkill(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (target_tid, signo) = (args[1], args[2] as i32);
    if !ctx.scheduler.has_thread(target_tid) {
        return ESRCH;
    }
    ctx.signals.queue_signal(ctx.tid, signo);
    0
}

pub fn rt_sigaction(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (signo, act_addr) = (args[0] as i32, args[1]);
    if !(1..64).contains(&signo) {
        return EINVAL;
    }
    if act_addr == 0 {
        // NULL `act` queries the existing handler without installing a new one.
        return 0;
    }
    let handler_addr = ctx.mem.read_val(ctx.engine, act_addr, 8).unwrap_or(0);
    let flags = ctx.mem.read_val(ctx.engine, act_addr + 8, 8).unwrap_or(0);
    let restorer_addr = ctx.mem.read_val(ctx.engine, act_addr + 16, 8).unwrap_or(0);
    let mask = ctx.mem.read_val(ctx.engine, act_addr + 24, 8).unwrap_or(0);
    ctx.signals.set_sighandler(
        signo,
        KSigAction {
            handler_addr,
            flags,
            mask,
            restorer_addr,
        },
    );
    0
}

pub fn rt_sigreturn(ctx: &mut SyscallContext) -> i64 {
    match ctx.signals.sigreturn() {
        Ok(frame) => {
            for (reg, val) in frame.regs.iter() {
                ctx.engine.reg_write(*reg, *val).ok();
            }
            0
        }
        Err(_) => EINVAL,
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
    fn kill_unknown_thread_is_esrch() {
        let ret = with_ctx(|ctx| kill(ctx, [9999, 9, 0, 0, 0, 0]));
        assert_eq!(ret, ESRCH);
    }

    #[test]
    fn tgkill_unknown_thread_is_esrch() {
        let ret = with_ctx(|ctx| tgkill(ctx, [1, 9999, 9, 0, 0, 0]));
        assert_eq!(ret, ESRCH);
    }

    #[test]
    fn rt_sigreturn_without_handler_is_einval() {
        let ret = with_ctx(|ctx| rt_sigreturn(ctx));
        assert_eq!(ret, EINVAL);
    }

    #[test]
    fn rt_sigaction_installs_a_handler() {
        let ret = with_ctx(|ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            ctx.mem.write_val(ctx.engine, 0x8000, 0x401000, 8).unwrap();
            let r = rt_sigaction(ctx, [15, 0x8000, 0, 0, 0, 0]);
            assert!(ctx.signals.has_sighandler(15));
            r
        });
        assert_eq!(ret, 0);
    }
}

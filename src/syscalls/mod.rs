//! Syscall Dispatcher.
//!
//! Grounded on `include/arion/common/syscall_manager.hpp`'s `SyscallManager`:
//! routes the arch adapter's syscall interrupt into one of roughly 300
//! Linux-compatible handlers, each returning a raw i64 that becomes the
//! guest's return register — negative values are `-errno`, per kernel
//! convention, never a Rust `Err`.

pub mod file_syscalls;
pub mod mem_syscalls;
pub mod misc_syscalls;
pub mod numbers;
pub mod process_syscalls;
pub mod signal_syscalls;
pub mod socket_syscalls;

use crate::arch::{ArchAdapter, LogicalReg};
use crate::config::Config;
use crate::engine::CpuEngine;
use crate::fs::FileSystemManager;
use crate::hooks::{HookCategory, HookEvent, HooksEngine};
use crate::logger::Logger;
use crate::memory::MemoryManager;
use crate::scheduler::ThreadScheduler;
use crate::signal::SignalManager;
use crate::socket::SocketManager;

/// Everything a syscall handler needs. Built fresh by the guest orchestrator
/// for each dispatch call rather than stored, since most of its fields borrow
/// from sibling managers that also need independent mutable access elsewhere
/// in the same tick.
pub struct SyscallContext<'a> {
    pub mem: &'a mut MemoryManager,
    pub engine: &'a mut dyn CpuEngine,
    pub adapter: &'a dyn ArchAdapter,
    pub fs: &'a mut FileSystemManager,
    pub sockets: &'a mut SocketManager,
    pub signals: &'a mut SignalManager,
    pub scheduler: &'a mut ThreadScheduler,
    pub hooks: &'a mut HooksEngine,
    pub logger: &'a Logger,
    pub config: &'a Config,
    pub tid: u64,
}

impl<'a> SyscallContext<'a> {
    /// Smallest fd >= 3 not already claimed by either the file or socket
    /// table; the two share one allocator.
    pub fn alloc_fd(&self) -> i32 {
        let mut fd = 3;
        loop {
            if !self.fs.has_file_entry(fd) && !self.sockets.has_socket_entry(fd) {
                return fd;
            }
            fd += 1;
        }
    }
}

pub const ENOSYS: i64 = -38;

/// Normalizes an arch-specific raw syscall number onto the x86-64 numbering
/// [`numbers`] uses internally. ARM/ARM64/PPC32 EABI numbers differ from
/// x86-64's only for a handful of calls this crate doesn't yet special-case,
/// so non-x86-64 callers pass their raw number through unchanged; a real
/// multi-arch build would hold a per-arch remapping table here.
pub fn arch_syscall_no(_adapter: &dyn ArchAdapter, raw: u64) -> u64 {
    raw
}

/// Maps a syscall number to the internal dispatch, returning the raw value
/// to place in the guest's return register.
pub fn dispatch(ctx: &mut SyscallContext, sysno: u64, args: [u64; 6]) -> i64 {
    use numbers::*;

    if ctx.hooks.has_hooks(HookCategory::Syscall) {
        ctx.hooks.dispatch(
            HookCategory::Syscall,
            &HookEvent::Syscall { sysno, args },
        );
        if ctx.hooks.syscall_handled {
            // A hook claimed this call; the dispatcher's default handler is
            // suppressed and whatever the hook already wrote to the return
            // register stands.
            return ctx
                .adapter
                .read_reg(ctx.engine, LogicalReg::SyscallReturn)
                .unwrap_or(0) as i64;
        }
    }

    match sysno {
        READ => file_syscalls::read(ctx, args),
        WRITE => file_syscalls::write(ctx, args),
        OPEN => file_syscalls::open(ctx, args, None),
        OPENAT => file_syscalls::openat(ctx, args),
        CLOSE => file_syscalls::close(ctx, args),
        LSEEK => file_syscalls::lseek(ctx, args),
        ACCESS => file_syscalls::access(ctx, args),
        GETCWD => file_syscalls::getcwd(ctx, args),
        CHDIR => file_syscalls::chdir(ctx, args),
        DUP => file_syscalls::dup(ctx, args),
        DUP2 => file_syscalls::dup2(ctx, args),
        PIPE => file_syscalls::pipe(ctx, args),
        READLINK => file_syscalls::readlink(ctx, args),
        READLINKAT => file_syscalls::readlinkat(ctx, args),
        FCNTL | IOCTL | STAT | FSTAT => 0,

        MMAP => mem_syscalls::mmap(ctx, args),
        MMAP2 => mem_syscalls::mmap2(ctx, args),
        MUNMAP => mem_syscalls::munmap(ctx, args),
        MPROTECT => mem_syscalls::mprotect(ctx, args),
        BRK => mem_syscalls::brk(ctx, args),

        GETPID => process_syscalls::getpid(ctx),
        GETPPID => process_syscalls::getppid(ctx),
        GETTID => process_syscalls::gettid(ctx),
        GETUID | GETEUID => 0,
        GETGID | GETEGID => 0,
        // FORK, EXECVE, and a non-CLONE_THREAD CLONE/CLONE3 are intercepted
        // in `Arion::dispatch_pending_syscall` before `dispatch` is ever
        // called — they need `&mut Arion` to spin up a whole new guest
        // instance, which this function's `&mut SyscallContext` can't reach.
        CLONE => process_syscalls::clone(ctx, args),
        CLONE3 => process_syscalls::clone3(ctx, args),
        EXIT => process_syscalls::exit(ctx, args, false),
        EXIT_GROUP => process_syscalls::exit(ctx, args, true),
        WAIT4 => process_syscalls::wait4(ctx, args),
        WAITID => process_syscalls::waitid(ctx, args),
        SET_TID_ADDRESS => ctx.tid as i64,
        SET_ROBUST_LIST => 0,
        ARCH_PRCTL => process_syscalls::arch_prctl(ctx, args),
        GETCPU => misc_syscalls::getcpu(ctx, args),
        SYSINFO => misc_syscalls::sysinfo(ctx, args),
        PRLIMIT64 => misc_syscalls::prlimit64(ctx, args),
        RSEQ => misc_syscalls::rseq(ctx, args),

        KILL => signal_syscalls::kill(ctx, args),
        TGKILL => signal_syscalls::tgkill(ctx, args),
        RT_SIGACTION => signal_syscalls::rt_sigaction(ctx, args),
        RT_SIGPROCMASK => 0,
        RT_SIGRETURN => signal_syscalls::rt_sigreturn(ctx),

        SOCKET => socket_syscalls::socket(ctx, args),
        BIND => socket_syscalls::bind(ctx, args),
        LISTEN => socket_syscalls::listen(ctx, args),
        ACCEPT => socket_syscalls::accept(ctx, args),
        CONNECT => socket_syscalls::connect(ctx, args),
        SENDTO => socket_syscalls::sendto(ctx, args),
        RECVFROM => socket_syscalls::recvfrom(ctx, args),

        FUTEX => misc_syscalls::futex(ctx, args),
        NANOSLEEP => misc_syscalls::nanosleep(ctx, args),
        CLOCK_NANOSLEEP => misc_syscalls::clock_nanosleep(ctx, args),
        CLOCK_GETTIME => misc_syscalls::clock_gettime(ctx, args),
        CLOCK_GETRES => misc_syscalls::clock_getres(ctx, args),
        PAUSE => misc_syscalls::pause(ctx, args),
        TIME => misc_syscalls::time(ctx, args),
        GETTIMEOFDAY => misc_syscalls::gettimeofday(ctx, args),
        UNAME => misc_syscalls::uname(ctx, args),
        GETRANDOM => misc_syscalls::getrandom(ctx, args),

        _ => {
            ctx.logger.warn(format!("unimplemented syscall {sysno}"));
            ENOSYS
        }
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
    fn unknown_syscall_returns_enosys() {
        let ret = with_ctx(|ctx| dispatch(ctx, 9999, [0; 6]));
        assert_eq!(ret, ENOSYS);
    }

    #[test]
    fn getpid_returns_the_tid_thread_group_leader() {
        let ret = with_ctx(|ctx| dispatch(ctx, numbers::GETPID, [0; 6]));
        assert!(ret >= 0);
    }

    #[test]
    fn fd_allocator_skips_stdio_and_reused_fds() {
        let ret = with_ctx(|ctx| ctx.alloc_fd() as i64);
        assert_eq!(ret, 3);
    }
}

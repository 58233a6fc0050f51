//! Everything left over: `futex`, `nanosleep`/`clock_nanosleep`, `time`,
//! `gettimeofday`, `uname`, `getrandom`.

use super::SyscallContext;

const EAGAIN: i64 = -11;
const EINVAL: i64 = -22;

pub fn futex(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    const FUTEX_WAIT: u64 = 0;
    const FUTEX_WAKE: u64 = 1;
    let (addr, op, val) = (args[0], args[1] & 0x7f, args[2]);
    match op {
        FUTEX_WAIT => {
            let current = ctx.mem.read_val(ctx.engine, addr, 4).unwrap_or(0);
            if current != val {
                return EAGAIN;
            }
            ctx.scheduler.block_on_futex(ctx.tid, addr).ok();
            0
        }
        FUTEX_WAKE => {
            let max = if val == 0 { u32::MAX } else { val as u32 };
            ctx.scheduler.wake_futex(addr, max) as i64
        }
        _ => EINVAL,
    }
}

/// Blocks the host thread for the requested duration iff
/// `config.enable_sleep_syscalls` is set — the Open Question this crate
/// resolved in favor of matching the original's direct host-call behavior
/// rather than a no-op stub.
pub fn nanosleep(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let req_addr = args[0];
    if !ctx.config.enable_sleep_syscalls {
        return 0;
    }
    let secs = ctx.mem.read_val(ctx.engine, req_addr, 8).unwrap_or(0);
    let nanos = ctx.mem.read_val(ctx.engine, req_addr + 8, 8).unwrap_or(0);
    std::thread::sleep(std::time::Duration::new(secs, nanos as u32));
    0
}

pub fn clock_nanosleep(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    // args[0] is clockid, args[1] flags, args[2] the `timespec*` — shifted to
    // match `nanosleep`'s layout.
    nanosleep(ctx, [args[2], args[3], args[4], args[5], 0, 0])
}

pub fn time(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    let out_addr = args[0];
    if out_addr != 0 {
        ctx.mem.write_val(ctx.engine, out_addr, now, 8).ok();
    }
    now as i64
}

/// `clock_gettime(clockid, timespec*)`: this crate doesn't distinguish
/// `CLOCK_MONOTONIC` from `CLOCK_REALTIME` — both read the host's wall clock.
pub fn clock_gettime(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let ts_addr = args[1];
    if ts_addr == 0 {
        return EINVAL;
    }
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    if ctx.mem.write_val(ctx.engine, ts_addr, now.as_secs(), 8).is_err()
        || ctx.mem.write_val(ctx.engine, ts_addr + 8, now.subsec_nanos() as u64, 8).is_err()
    {
        return EINVAL;
    }
    0
}

/// `clock_getres`: reports 1-nanosecond resolution for every clockid this
/// crate recognizes.
pub fn clock_getres(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let ts_addr = args[1];
    if ts_addr == 0 {
        return 0;
    }
    if ctx.mem.write_val(ctx.engine, ts_addr, 0, 8).is_err() || ctx.mem.write_val(ctx.engine, ts_addr + 8, 1, 8).is_err() {
        return EINVAL;
    }
    0
}

/// `pause()`: parks the calling thread until a signal arrives, reusing the
/// scheduler's sigwait block state. Always resumes reporting `-EINTR`, the
/// only way `pause` ever returns.
pub fn pause(ctx: &mut SyscallContext, _args: [u64; 6]) -> i64 {
    const EINTR: i64 = -4;
    ctx.scheduler.block_on_sigwait(ctx.tid).ok();
    EINTR
}

/// `sysinfo(struct sysinfo*)`: fills in plausible but synthetic system
/// totals — a guest should never learn the host's actual memory pressure.
pub fn sysinfo(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let base = args[0];
    const ONE_GIB: u64 = 1 << 30;
    let uptime = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    let fields: [(u64, u64); 8] = [
        (0, uptime),   // uptime
        (8, 0),        // loads[0]
        (16, 0),       // loads[1]
        (24, 0),       // loads[2]
        (32, ONE_GIB), // totalram
        (40, ONE_GIB), // freeram
        (48, 0),       // sharedram
        (56, 0),       // bufferram
    ];
    for (off, val) in fields {
        if ctx.mem.write_val(ctx.engine, base + off, val, 8).is_err() {
            return EINVAL;
        }
    }
    ctx.mem.write_val(ctx.engine, base + 64, 0, 8).ok(); // totalswap
    ctx.mem.write_val(ctx.engine, base + 72, 0, 8).ok(); // freeswap
    ctx.mem.write_val(ctx.engine, base + 80, 1, 2).ok(); // procs
    ctx.mem.write_val(ctx.engine, base + 108, 1, 4).ok(); // mem_unit
    0
}

/// `prlimit64(pid, resource, new_limit*, old_limit*)`: this crate never
/// enforces resource limits, so every query reports `RLIM_INFINITY` and
/// every set request is silently accepted.
pub fn prlimit64(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let old_limit_addr = args[3];
    if old_limit_addr != 0 {
        if ctx.mem.write_val(ctx.engine, old_limit_addr, u64::MAX, 8).is_err()
            || ctx.mem.write_val(ctx.engine, old_limit_addr + 8, u64::MAX, 8).is_err()
        {
            return EINVAL;
        }
    }
    0
}

/// `getcpu(cpu*, node*, unused)`: this crate always reports running on CPU 0
/// of NUMA node 0, matching its single-host-thread scheduler.
pub fn getcpu(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (cpu_addr, node_addr) = (args[0], args[1]);
    if cpu_addr != 0 {
        ctx.mem.write_val(ctx.engine, cpu_addr, 0, 4).ok();
    }
    if node_addr != 0 {
        ctx.mem.write_val(ctx.engine, node_addr, 0, 4).ok();
    }
    0
}

/// `rseq(rseq*, rseq_len, flags, sig)`: restartable sequences need real
/// preemption signals from the host kernel to matter, which this emulator's
/// single-host-thread scheduler never delivers; registration is accepted and
/// otherwise ignored, matching `SET_ROBUST_LIST`'s stub.
pub fn rseq(_ctx: &mut SyscallContext, _args: [u64; 6]) -> i64 {
    0
}

pub fn gettimeofday(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let tv_addr = args[0];
    if tv_addr == 0 {
        return 0;
    }
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    ctx.mem.write_val(ctx.engine, tv_addr, now.as_secs(), 8).ok();
    ctx.mem.write_val(ctx.engine, tv_addr + 8, now.subsec_micros() as u64, 8).ok();
    0
}

/// Fills `struct utsname` with this crate's synthesized identity rather than
/// the host's (a guest should never learn the name of the host kernel it's
/// actually running on).
pub fn uname(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    const FIELD_LEN: u64 = 65;
    let base = args[0];
    let fields = ["Linux", "arion", "5.15.0-arion", "#1 SMP", ctx.adapter.arch().name(), ""];
    for (i, field) in fields.iter().enumerate() {
        let addr = base + FIELD_LEN * i as u64;
        if ctx.mem.write_string(ctx.engine, addr, field).is_err() {
            return EINVAL;
        }
    }
    0
}

pub fn getrandom(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    use rand::RngCore;
    let (buf_addr, len) = (args[0], args[1] as usize);
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    match ctx.mem.write(ctx.engine, buf_addr, &buf) {
        Ok(()) => len as i64,
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

    fn with_ctx<F: FnOnce(&mut SyscallContext) -> i64>(config: Config, f: F) -> i64 {
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
    fn nanosleep_is_a_noop_unless_enabled() {
        let ret = with_ctx(Config::default(), |ctx| nanosleep(ctx, [0, 0, 0, 0, 0, 0]));
        assert_eq!(ret, 0);
    }

    #[test]
    fn futex_wait_rejects_mismatched_value() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            ctx.mem.write_val(ctx.engine, 0x8000, 5, 4).unwrap();
            futex(ctx, [0x8000, 0, 1, 0, 0, 0])
        });
        assert_eq!(ret, EAGAIN);
    }

    #[test]
    fn getrandom_fills_requested_length() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            getrandom(ctx, [0x8000, 16, 0, 0, 0, 0])
        });
        assert_eq!(ret, 16);
    }

    #[test]
    fn clock_gettime_writes_a_timespec() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            let r = clock_gettime(ctx, [0, 0x8000, 0, 0, 0, 0]);
            let secs = ctx.mem.read_val(ctx.engine, 0x8000, 8).unwrap();
            assert!(secs > 0);
            r
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn clock_getres_reports_nanosecond_resolution() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            let r = clock_getres(ctx, [0, 0x8000, 0, 0, 0, 0]);
            assert_eq!(ctx.mem.read_val(ctx.engine, 0x8008, 8).unwrap(), 1);
            r
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn pause_blocks_and_reports_eintr() {
        let ret = with_ctx(Config::default(), |ctx| pause(ctx, [0; 6]));
        assert_eq!(ret, -4);
    }

    #[test]
    fn sysinfo_fills_synthetic_totals() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            sysinfo(ctx, [0x8000, 0, 0, 0, 0, 0])
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn prlimit64_reports_rlim_infinity() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            let r = prlimit64(ctx, [0, 0, 0, 0x8000, 0, 0]);
            assert_eq!(ctx.mem.read_val(ctx.engine, 0x8000, 8).unwrap(), u64::MAX);
            r
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn getcpu_reports_cpu_zero() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            getcpu(ctx, [0x8000, 0, 0, 0, 0, 0])
        });
        assert_eq!(ret, 0);
    }

    #[test]
    fn uname_reports_synthesized_identity() {
        let ret = with_ctx(Config::default(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            let r = uname(ctx, [0x8000, 0, 0, 0, 0, 0]);
            let sysname = ctx.mem.read_c_string(ctx.engine, 0x8000, 64).unwrap();
            assert_eq!(sysname, "Linux");
            r
        });
        assert_eq!(ret, 0);
    }
}

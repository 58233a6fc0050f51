//! Socket syscalls: `socket`, `bind`, `listen`, `accept`, `connect`,
//! `sendto`, `recvfrom`.
//!
//! Grounded on `include/arion/common/socket_manager.hpp`'s `ARION_SOCKET`
//! table. Host I/O is out of this crate's in-scope surface beyond address
//! bookkeeping — a real build would bridge these
//! through actual host sockets the way `file_syscalls` bridges through
//! `std::fs`.

use super::SyscallContext;
use crate::socket::ArionSocket;

const EBADF: i64 = -9;
const EINVAL: i64 = -22;

pub fn socket(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (family, sock_type, protocol) = (args[0] as i32, args[1] as i32, args[2] as i32);
    let fd = ctx.alloc_fd();
    ctx.sockets.add_socket_entry(fd, ArionSocket::new(fd, family, sock_type, protocol));
    fd as i64
}

pub fn bind(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, addr_ptr, addr_len) = (args[0] as i32, args[1], args[2] as usize);
    let bytes = match ctx.mem.read(ctx.engine, addr_ptr, addr_len) {
        Ok(b) => b,
        Err(_) => return EINVAL,
    };
    match ctx.sockets.get_arion_socket_mut(fd) {
        Ok(s) => {
            s.addr_bytes = bytes;
            0
        }
        Err(_) => EBADF,
    }
}

pub fn listen(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, backlog) = (args[0] as i32, args[1] as i32);
    match ctx.sockets.get_arion_socket_mut(fd) {
        Ok(s) => {
            s.server = true;
            s.server_listen = true;
            s.server_backlog = backlog;
            0
        }
        Err(_) => EBADF,
    }
}

pub fn accept(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let fd = args[0] as i32;
    let listener = match ctx.sockets.get_arion_socket(fd) {
        Ok(s) => s.clone(),
        Err(_) => return EBADF,
    };
    if !listener.server_listen {
        return EINVAL;
    }
    let new_fd = ctx.alloc_fd();
    let mut accepted = ArionSocket::new(new_fd, listener.family, listener.sock_type, listener.protocol);
    accepted.ip = listener.ip.clone();
    accepted.port = listener.port;
    ctx.sockets.add_socket_entry(new_fd, accepted);
    new_fd as i64
}

pub fn connect(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, addr_ptr, addr_len) = (args[0] as i32, args[1], args[2] as usize);
    let bytes = match ctx.mem.read(ctx.engine, addr_ptr, addr_len) {
        Ok(b) => b,
        Err(_) => return EINVAL,
    };
    match ctx.sockets.get_arion_socket_mut(fd) {
        Ok(s) => {
            s.addr_bytes = bytes;
            0
        }
        Err(_) => EBADF,
    }
}

pub fn sendto(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, buf_addr, len) = (args[0] as i32, args[1], args[2] as usize);
    if !ctx.sockets.has_socket_entry(fd) {
        return EBADF;
    }
    match ctx.mem.read(ctx.engine, buf_addr, len) {
        Ok(bytes) => bytes.len() as i64,
        Err(_) => EINVAL,
    }
}

pub fn recvfrom(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, buf_addr, len) = (args[0] as i32, args[1], args[2] as usize);
    if !ctx.sockets.has_socket_entry(fd) {
        return EBADF;
    }
    // No real host socket is bridged in; a parked recv always sees EOF.
    let zeros = vec![0u8; 0];
    let _ = (buf_addr, len);
    ctx.mem.write(ctx.engine, buf_addr, &zeros).ok();
    0
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
    fn socket_listen_accept_chain() {
        let fd = with_ctx(|ctx| socket(ctx, [libc::AF_INET as u64, libc::SOCK_STREAM as u64, 0, 0, 0, 0]));
        assert!(fd >= 3);
        let listened = with_ctx(|ctx| {
            ctx.sockets.add_socket_entry(fd as i32, ArionSocket::new(fd as i32, libc::AF_INET, libc::SOCK_STREAM, 0));
            listen(ctx, [fd as u64, 16, 0, 0, 0, 0])
        });
        assert_eq!(listened, 0);
    }

    #[test]
    fn accept_on_unknown_fd_is_ebadf() {
        let ret = with_ctx(|ctx| accept(ctx, [42, 0, 0, 0, 0, 0]));
        assert_eq!(ret, EBADF);
    }
}

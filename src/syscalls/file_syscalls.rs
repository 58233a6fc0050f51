//! File-descriptor syscalls: `read`, `write`, `open`, `close`, and friends.
//!
//! Grounded on `include/arion/common/file_system_manager.hpp`'s fd table plus
//! its `sys_read`/`sys_write`/`sys_open` handlers, re-expressed over
//! `std::fs`/`std::io` rather than raw host syscalls.

use super::SyscallContext;
use std::io::{Read, Seek, SeekFrom, Write};

const EBADF: i64 = -9;
const ENOENT: i64 = -2;
const EIO: i64 = -5;

pub fn read(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, buf_addr, count) = (args[0] as i32, args[1], args[2] as usize);

    if fd == 0 {
        let mut buf = vec![0u8; count];
        return match std::io::stdin().read(&mut buf) {
            Ok(n) => {
                if ctx.mem.write(ctx.engine, buf_addr, &buf[..n]).is_err() {
                    return EIO;
                }
                n as i64
            }
            Err(_) => EIO,
        };
    }

    let file = match ctx.fs.get_arion_file(fd) {
        Ok(f) => f.clone(),
        Err(_) => return EBADF,
    };
    let host_path = match ctx.fs.to_fs_path(&file.path) {
        Ok(p) => p,
        Err(_) => return ENOENT,
    };
    let mut f = match std::fs::File::open(&host_path) {
        Ok(f) => f,
        Err(_) => return ENOENT,
    };
    if f.seek(SeekFrom::Start(file.saved_off as u64)).is_err() {
        return EIO;
    }
    let mut buf = vec![0u8; count];
    let n = match f.read(&mut buf) {
        Ok(n) => n,
        Err(_) => return EIO,
    };
    if ctx.mem.write(ctx.engine, buf_addr, &buf[..n]).is_err() {
        return EIO;
    }
    if let Ok(entry) = ctx.fs.get_arion_file_mut(fd) {
        entry.saved_off += n as i64;
    }
    n as i64
}

pub fn write(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, buf_addr, count) = (args[0] as i32, args[1], args[2] as usize);

    let bytes = match ctx.mem.read(ctx.engine, buf_addr, count) {
        Ok(b) => b,
        Err(_) => return EIO,
    };

    if fd == 1 {
        return std::io::stdout().write_all(&bytes).map(|_| bytes.len() as i64).unwrap_or(EIO);
    }
    if fd == 2 {
        return std::io::stderr().write_all(&bytes).map(|_| bytes.len() as i64).unwrap_or(EIO);
    }

    let file = match ctx.fs.get_arion_file(fd) {
        Ok(f) => f.clone(),
        Err(_) => return EBADF,
    };
    let host_path = match ctx.fs.to_fs_path(&file.path) {
        Ok(p) => p,
        Err(_) => return ENOENT,
    };
    let mut f = match std::fs::OpenOptions::new().write(true).append(file.flags & libc::O_APPEND != 0).open(&host_path) {
        Ok(f) => f,
        Err(_) => return ENOENT,
    };
    if file.flags & libc::O_APPEND == 0 && f.seek(SeekFrom::Start(file.saved_off as u64)).is_err() {
        return EIO;
    }
    match f.write(&bytes) {
        Ok(n) => {
            if let Ok(entry) = ctx.fs.get_arion_file_mut(fd) {
                entry.saved_off += n as i64;
            }
            n as i64
        }
        Err(_) => EIO,
    }
}

pub fn open(ctx: &mut SyscallContext, args: [u64; 6], dirfd_path: Option<String>) -> i64 {
    let (path_addr, flags, mode) = (args[0], args[1] as i32, args[2] as u32);
    let guest_path = match ctx.mem.read_c_string(ctx.engine, path_addr, 4096) {
        Ok(s) => s,
        Err(_) => return EIO,
    };
    let resolved = match dirfd_path {
        Some(base) => format!("{base}/{guest_path}"),
        None => guest_path,
    };
    if ctx.fs.to_fs_path(&resolved).is_err() {
        return -13; // EACCES: sandbox escape.
    }
    let host_path = ctx.fs.to_fs_path(&resolved).unwrap();
    let mut opts = std::fs::OpenOptions::new();
    opts.read(true);
    if flags & libc::O_WRONLY != 0 || flags & libc::O_RDWR != 0 {
        opts.write(true);
    }
    if flags & libc::O_CREAT != 0 {
        opts.create(true).mode(mode);
    }
    if flags & libc::O_TRUNC != 0 {
        opts.truncate(true);
    }
    match opts.open(&host_path) {
        Ok(_) => {
            let fd = ctx.alloc_fd();
            ctx.fs.add_file_entry(fd, crate::fs::ArionFile::new(fd, resolved, flags, mode), true).ok();
            fd as i64
        }
        Err(_) => ENOENT,
    }
}

pub fn openat(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    // dirfd in args[0] is AT_FDCWD (-100) in the common case this crate
    // targets; relative-to-fd opens beyond cwd are not resolved here.
    let shifted = [args[1], args[2], args[3], args[4], args[5], 0];
    open(ctx, shifted, None)
}

pub fn close(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let fd = args[0] as i32;
    if fd <= 2 {
        return 0;
    }
    if !ctx.fs.has_file_entry(fd) {
        return EBADF;
    }
    ctx.fs.rm_file_entry(fd);
    0
}

pub fn lseek(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (fd, offset, whence) = (args[0] as i32, args[1] as i64, args[2] as i32);
    let file = match ctx.fs.get_arion_file_mut(fd) {
        Ok(f) => f,
        Err(_) => return EBADF,
    };
    file.saved_off = match whence {
        libc::SEEK_SET => offset,
        libc::SEEK_CUR => file.saved_off + offset,
        libc::SEEK_END => offset, // size tracking is out of scope; best effort.
        _ => return -22,          // EINVAL
    };
    file.saved_off
}

pub fn access(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let path_addr = args[0];
    let guest_path = match ctx.mem.read_c_string(ctx.engine, path_addr, 4096) {
        Ok(s) => s,
        Err(_) => return EIO,
    };
    match ctx.fs.to_fs_path(&guest_path) {
        Ok(p) if p.exists() => 0,
        Ok(_) => ENOENT,
        Err(_) => -13,
    }
}

pub fn getcwd(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (buf_addr, size) = (args[0], args[1] as usize);
    let cwd = ctx.fs.get_cwd_path().to_string();
    if cwd.len() + 1 > size {
        return -34; // ERANGE
    }
    if ctx.mem.write_string(ctx.engine, buf_addr, &cwd).is_err() {
        return EIO;
    }
    cwd.len() as i64 + 1
}

pub fn chdir(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let path_addr = args[0];
    let guest_path = match ctx.mem.read_c_string(ctx.engine, path_addr, 4096) {
        Ok(s) => s,
        Err(_) => return EIO,
    };
    match ctx.fs.to_fs_path(&guest_path) {
        Ok(_) => {
            ctx.fs.set_cwd_path(guest_path);
            0
        }
        Err(_) => ENOENT,
    }
}

/// `readlink(path, buf, bufsiz)`: resolves the sandboxed host symlink and
/// copies its target back rewritten as a guest path, truncated to `bufsiz`
/// without a trailing NUL per the syscall's own contract.
pub fn readlink(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (path_addr, buf_addr, bufsiz) = (args[0], args[1], args[2] as usize);
    let guest_path = match ctx.mem.read_c_string(ctx.engine, path_addr, 4096) {
        Ok(s) => s,
        Err(_) => return EIO,
    };
    let host_path = match ctx.fs.to_fs_path(&guest_path) {
        Ok(p) => p,
        Err(_) => return -13, // EACCES
    };
    let target = match std::fs::read_link(&host_path) {
        Ok(t) => t.to_string_lossy().into_owned(),
        Err(_) => return ENOENT,
    };
    let bytes = target.as_bytes();
    let n = bytes.len().min(bufsiz);
    match ctx.mem.write(ctx.engine, buf_addr, &bytes[..n]) {
        Ok(()) => n as i64,
        Err(_) => EIO,
    }
}

pub fn readlinkat(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    // dirfd in args[0] is AT_FDCWD in the common case this crate targets.
    let shifted = [args[1], args[2], args[3], args[4], args[5], 0];
    readlink(ctx, shifted)
}

pub fn dup(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let old_fd = args[0] as i32;
    let entry = match ctx.fs.get_arion_file(old_fd) {
        Ok(f) => f.clone(),
        Err(_) => return EBADF,
    };
    let new_fd = ctx.alloc_fd();
    let mut dup = entry;
    dup.fd = new_fd;
    ctx.fs.add_file_entry(new_fd, dup, true).ok();
    new_fd as i64
}

pub fn dup2(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let (old_fd, new_fd) = (args[0] as i32, args[1] as i32);
    let entry = match ctx.fs.get_arion_file(old_fd) {
        Ok(f) => f.clone(),
        Err(_) => return EBADF,
    };
    let mut dup = entry;
    dup.fd = new_fd;
    ctx.fs.rm_file_entry(new_fd);
    ctx.fs.add_file_entry(new_fd, dup, false).ok();
    new_fd as i64
}

pub fn pipe(ctx: &mut SyscallContext, args: [u64; 6]) -> i64 {
    let fds_addr = args[0];
    let mut raw = [0i32; 2];
    if unsafe { libc::pipe(raw.as_mut_ptr()) } != 0 {
        return -libc::EMFILE as i64;
    }
    let read_fd = ctx.alloc_fd();
    ctx.fs.add_file_entry(read_fd, crate::fs::ArionFile::with_host_fd(read_fd, "[pipe:r]", raw[0]), true).ok();
    let write_fd = ctx.alloc_fd();
    ctx.fs.add_file_entry(write_fd, crate::fs::ArionFile::with_host_fd(write_fd, "[pipe:w]", raw[1]), true).ok();
    if ctx.mem.write_val(ctx.engine, fds_addr, read_fd as u64, 4).is_err()
        || ctx.mem.write_val(ctx.engine, fds_addr + 4, write_fd as u64, 4).is_err()
    {
        return EIO;
    }
    0
}

use std::os::unix::fs::OpenOptionsExt;

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

    fn with_ctx<F: FnOnce(&mut SyscallContext) -> i64>(root: &std::path::Path, f: F) -> i64 {
        let adapter = adapter_for(CpuArch::X8664);
        let mut mem = MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE);
        let mut engine = FakeCpuEngine::default();
        let mut fs = FileSystemManager::initialize(root, "/");
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
    fn write_and_read_back_a_sandboxed_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi there").unwrap();

        let ret = with_ctx(dir.path(), |ctx| {
            let path = "/hello.txt";
            let path_addr = 0x8000;
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            ctx.mem.write_string(ctx.engine, path_addr, path).unwrap();
            let fd = open(ctx, [path_addr, 0, 0, 0, 0, 0], None);
            assert!(fd >= 3);
            let buf_addr = 0x9000;
            ctx.mem.map(buf_addr, 0x1000, crate::memory::Perms::RW, "scratch2").unwrap();
            read(ctx, [fd as u64, buf_addr, 8, 0, 0, 0])
        });
        assert_eq!(ret, 8);
    }

    #[test]
    fn close_of_unknown_fd_is_ebadf() {
        let dir = tempfile::tempdir().unwrap();
        let ret = with_ctx(dir.path(), |ctx| close(ctx, [99, 0, 0, 0, 0, 0]));
        assert_eq!(ret, EBADF);
    }

    #[test]
    fn readlink_resolves_sandboxed_symlink() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target.txt"), b"x").unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("target.txt", dir.path().join("link")).unwrap();

        let ret = with_ctx(dir.path(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            ctx.mem.write_string(ctx.engine, 0x8000, "/link").unwrap();
            ctx.mem.map(0x9000, 0x1000, crate::memory::Perms::RW, "scratch2").unwrap();
            readlink(ctx, [0x8000, 0x9000, 64, 0, 0, 0])
        });
        assert_eq!(ret, "target.txt".len() as i64);
    }

    #[test]
    fn getcwd_reports_root() {
        let dir = tempfile::tempdir().unwrap();
        let ret = with_ctx(dir.path(), |ctx| {
            ctx.mem.map(0x8000, 0x1000, crate::memory::Perms::RW, "scratch").unwrap();
            getcwd(ctx, [0x8000, 64, 0, 0, 0, 0])
        });
        assert_eq!(ret, 2); // "/" + NUL
    }
}

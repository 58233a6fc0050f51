//! x86-64 Linux syscall numbers the dispatcher recognizes.
//!
//! Other architectures remap onto this same table in
//! [`crate::syscalls::arch_syscall_no`] rather than keeping a second constant
//! set per arch: syscall numbers are arch-specific, so the dispatcher
//! normalizes onto one internal numbering instead.

pub const READ: u64 = 0;
pub const WRITE: u64 = 1;
pub const OPEN: u64 = 2;
pub const CLOSE: u64 = 3;
pub const STAT: u64 = 4;
pub const FSTAT: u64 = 5;
pub const LSEEK: u64 = 8;
pub const MMAP: u64 = 9;
pub const MPROTECT: u64 = 10;
pub const MUNMAP: u64 = 11;
pub const BRK: u64 = 12;
pub const RT_SIGACTION: u64 = 13;
pub const RT_SIGPROCMASK: u64 = 14;
pub const RT_SIGRETURN: u64 = 15;
pub const IOCTL: u64 = 16;
pub const ACCESS: u64 = 21;
pub const PIPE: u64 = 22;
pub const PAUSE: u64 = 34;
pub const DUP: u64 = 32;
pub const DUP2: u64 = 33;
pub const NANOSLEEP: u64 = 35;
pub const GETPID: u64 = 39;
/// Not an upstream Linux number: this crate's `mmap` handler already covers
/// both variants, so `mmap2`'s page-granularity offset is normalized onto
/// `MMAP`'s byte offset by [`crate::syscalls::mem_syscalls::mmap2`] before
/// ever reaching this constant's slot in the dispatcher.
pub const MMAP2: u64 = 192;
pub const SOCKET: u64 = 41;
pub const CONNECT: u64 = 42;
pub const ACCEPT: u64 = 43;
pub const SENDTO: u64 = 44;
pub const RECVFROM: u64 = 45;
pub const BIND: u64 = 49;
pub const LISTEN: u64 = 50;
pub const CLONE: u64 = 56;
pub const FORK: u64 = 57;
pub const EXECVE: u64 = 59;
pub const EXIT: u64 = 60;
pub const WAIT4: u64 = 61;
pub const KILL: u64 = 62;
pub const UNAME: u64 = 63;
pub const FCNTL: u64 = 72;
pub const READLINK: u64 = 89;
pub const GETCWD: u64 = 79;
pub const CHDIR: u64 = 80;
pub const SYSINFO: u64 = 99;
pub const GETTIMEOFDAY: u64 = 96;
pub const GETUID: u64 = 102;
pub const GETGID: u64 = 104;
pub const GETEUID: u64 = 107;
pub const GETEGID: u64 = 108;
pub const GETPPID: u64 = 110;
pub const GETTID: u64 = 186;
pub const TIME: u64 = 201;
pub const FUTEX: u64 = 202;
pub const SET_TID_ADDRESS: u64 = 218;
pub const CLOCK_GETTIME: u64 = 228;
pub const CLOCK_GETRES: u64 = 229;
pub const CLOCK_NANOSLEEP: u64 = 230;
pub const EXIT_GROUP: u64 = 231;
pub const TGKILL: u64 = 234;
pub const OPENAT: u64 = 257;
pub const READLINKAT: u64 = 267;
pub const SET_ROBUST_LIST: u64 = 273;
pub const ARCH_PRCTL: u64 = 158;
pub const WAITID: u64 = 247;
pub const GETRANDOM: u64 = 318;
pub const PRLIMIT64: u64 = 302;
pub const GETCPU: u64 = 309;
pub const RSEQ: u64 = 334;
pub const CLONE3: u64 = 435;

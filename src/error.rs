//! Crate-wide error taxonomy.
//!
//! Every sub-manager has its own leaf error enum, composed into
//! [`ArionError`] at the orchestrator boundary. Syscall failures are the
//! exception — per Linux convention they
//! never bubble up as a Rust error, they are written as a negative errno into
//! the guest's return register (see `crate::syscalls`).

use thiserror::Error;

pub type ArionResult<T> = Result<T, ArionError>;

#[derive(Debug, Error)]
pub enum ArionError {
    #[error("memory manager error: {0}")]
    Memory(#[from] MemError),

    #[error("arch/abi adapter error: {0}")]
    Arch(#[from] ArchError),

    #[error("loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("signal manager error: {0}")]
    Signal(#[from] SignalError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedError),

    #[error("fs manager error: {0}")]
    Fs(#[from] FsError),

    #[error("bad configuration: {0}")]
    Config(String),

    #[error("back-reference to guest has expired")]
    ExpiredBackref,
}

#[derive(Debug, Error)]
pub enum MemError {
    #[error("no free region large enough for {requested} bytes")]
    MemoryExhausted { requested: usize },
    #[error("address {addr:#x} is not aligned to the page size")]
    Misaligned { addr: u64 },
    #[error("access to {addr:#x} (len {len}) crosses an unmapped or permission boundary")]
    InvalidAccess { addr: u64, len: usize },
    #[error("no mapping contains address {0:#x}")]
    NotMapped(u64),
    #[error("string at {addr:#x} exceeds the {max} byte read cap")]
    StringTooLong { addr: u64, max: usize },
}

#[derive(Debug, Error)]
pub enum ArchError {
    #[error("unknown register '{0}' for this architecture")]
    UnknownRegister(String),
    #[error("engine register access failed: {0}")]
    EngineFault(String),
    #[error("unsupported architecture/mode combination: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("malformed ELF image: {0}")]
    MalformedElf(String),
    #[error("unsupported ELF class for this build: {0}")]
    UnsupportedClass(String),
    #[error("interpreter binary could not be resolved: {0}")]
    InterpNotFound(String),
    #[error(transparent)]
    Memory(#[from] MemError),
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("signal number {0} is out of range")]
    BadSigno(i32),
    #[error("no handler context to return from (sigreturn with empty stack)")]
    NoPendingFrame,
}

#[derive(Debug, Error)]
pub enum SchedError {
    #[error("too many guest instances alive at once (limit {0})")]
    TooManyGuests(usize),
    #[error("too many loggers allocated at once (limit {0})")]
    TooManyLoggers(usize),
    #[error("no guest with pid {0}")]
    NoSuchGuest(u64),
    #[error("no thread with tid {0} in guest {1}")]
    NoSuchThread(u64, u64),
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("path '{0}' escapes the configured filesystem sandbox")]
    Sandbox(String),
    #[error("guest fd {0} is already in use")]
    FdInUse(i32),
    #[error("no such guest fd {0}")]
    NoSuchFd(i32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

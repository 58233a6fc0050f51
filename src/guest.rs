//! The guest orchestrator: wires every sub-manager together into one
//! runnable emulation session.
//!
//! Grounded on `include/arion/arion.hpp`'s `Arion` class: owns one
//! `MemoryManager`, `ArchAdapter`, `HooksEngine`, `SignalManager`,
//! `FileSystemManager`, `SocketManager`, `ThreadScheduler` and `Logger`, and
//! exposes the surface the rest of the crate is built to support.
//! Sub-managers that need to call back into the guest (a hook callback
//! reading another manager's state) hold a [`GuestBackref`] — a `Weak`
//! handle, never an owning one, so the guest's own `Rc` cycle with its
//! managers never leaks.

use crate::arch::{adapter_for, ArchAdapter, LogicalReg};
use crate::config::Config;
use crate::engine::CpuEngine;
use crate::error::{ArionError, ArionResult};
use crate::fs::FileSystemManager;
use crate::hooks::{HookCategory, HookEvent, HookId, HooksEngine};
use crate::loader::{LinuxBaremetalLoader, LinuxElfLoader, LinuxLoader, LoaderParams};
use crate::logger::Logger;
use crate::memory::MemoryManager;
use crate::scheduler::ThreadScheduler;
use crate::signal::SignalManager;
use crate::snapshot::{bits_to_perms, perms_to_bits, ContextSnapshot, MemoryRegionSnapshot};
use crate::socket::SocketManager;
use crate::syscalls::numbers;
use crate::syscalls::process_syscalls::CLONE_THREAD;
use crate::syscalls::{self, SyscallContext};
use crate::types::CpuArch;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// A non-owning handle back to the `Arion` instance that created it. Holding
/// this instead of `ArionHandle` lets a hook closure or sub-manager reach the
/// guest without keeping it alive past its own lifetime.
#[derive(Clone)]
pub struct GuestBackref(Weak<RefCell<Arion>>);

impl GuestBackref {
    pub fn upgrade(&self) -> ArionResult<ArionHandle> {
        self.0.upgrade().ok_or(ArionError::ExpiredBackref)
    }
}

pub type ArionHandle = Rc<RefCell<Arion>>;

/// The top-level multi-guest owner: every `fork(2)`'d descendant of one
/// original process shares a `GroupHandle`, the way `include/arion/common/
/// arion_group.hpp`'s original `ArionGroup` tracked every process spawned
/// from one `Arion::new_instance` call, not just one guest's own threads (a
/// single guest's own threads are `ThreadScheduler`'s job, not this one's).
/// Holds only weak backrefs to its members — each member holds a strong
/// `GroupHandle` back, so the group outlives its last live member and no
/// longer.
pub struct ArionGroup {
    instances: Vec<GuestBackref>,
}

pub type GroupHandle = Rc<RefCell<ArionGroup>>;

impl ArionGroup {
    pub fn new() -> Self {
        Self { instances: Vec::new() }
    }

    pub fn add_instance(&mut self, backref: GuestBackref) {
        self.instances.push(backref);
    }

    /// Every still-alive member, parent and forked descendants alike.
    pub fn instances(&self) -> Vec<ArionHandle> {
        self.instances.iter().filter_map(|b| b.upgrade().ok()).collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances().len()
    }

    /// Round-robins `step` across every live member until none has a
    /// runnable thread left.
    pub fn run_to_completion(group: &GroupHandle) -> ArionResult<()> {
        loop {
            let members = group.borrow().instances();
            if members.is_empty() {
                return Ok(());
            }
            let mut any_ran = false;
            for member in members {
                if member.borrow_mut().step()? {
                    any_ran = true;
                }
            }
            if !any_ran {
                return Ok(());
            }
        }
    }
}

impl Default for ArionGroup {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Arion {
    pid: u64,
    logger: Logger,
    config: Config,
    arch: CpuArch,
    adapter: Box<dyn ArchAdapter>,
    engine: Box<dyn CpuEngine>,
    mem: MemoryManager,
    hooks: HooksEngine,
    signals: SignalManager,
    fs: FileSystemManager,
    sockets: SocketManager,
    scheduler: ThreadScheduler,
    group: GroupHandle,
    self_ref: GuestBackref,
}

impl Arion {
    /// Builds a new session around `engine` (the out-of-scope CPU emulator)
    /// and returns a reference-counted handle, per `Arion::new_instance`.
    /// Starts out as the sole member of a brand new [`ArionGroup`]; a later
    /// `fork(2)` joins its child to the same group instead of minting one.
    pub fn new_instance(arch: CpuArch, engine: Box<dyn CpuEngine>, fs_root: impl Into<std::path::PathBuf>, config: Config) -> ArionHandle {
        Rc::new_cyclic(|weak| {
            let mut scheduler = ThreadScheduler::new();
            let pid = scheduler.spawn_main_thread();
            let group: GroupHandle = Rc::new(RefCell::new(ArionGroup::new()));
            group.borrow_mut().add_instance(GuestBackref(weak.clone()));
            RefCell::new(Arion {
                pid,
                logger: Logger::new(pid, config.log_lvl),
                config,
                arch,
                adapter: adapter_for(arch),
                engine,
                mem: MemoryManager::new(crate::memory::DEFAULT_MMAP_BASE),
                hooks: HooksEngine::new(),
                signals: SignalManager::initialize(),
                fs: FileSystemManager::initialize(fs_root, "/"),
                sockets: SocketManager::initialize(),
                scheduler,
                group,
                self_ref: GuestBackref(weak.clone()),
            })
        })
    }

    pub fn group(&self) -> GroupHandle {
        self.group.clone()
    }

    pub fn pid(&self) -> u64 {
        self.pid
    }

    pub fn arch(&self) -> CpuArch {
        self.arch
    }

    pub fn backref(&self) -> GuestBackref {
        self.self_ref.clone()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn mem(&self) -> &MemoryManager {
        &self.mem
    }

    pub fn mem_mut(&mut self) -> &mut MemoryManager {
        &mut self.mem
    }

    pub fn hook<F>(&mut self, category: HookCategory, callback: F) -> HookId
    where
        F: FnMut(&HookEvent) + Send + 'static,
    {
        self.hooks.hook(category, callback)
    }

    pub fn unhook(&mut self, id: HookId) {
        self.hooks.unhook(id);
    }

    /// Parses and maps an ELF image, then hands control to `run`.
    pub fn load_elf(&mut self, program_args: Vec<String>, program_env: Vec<String>, image: crate::elf::ElfImage) -> ArionResult<LoaderParams> {
        let loader = LinuxElfLoader::new(program_args, program_env, image);
        let params = loader.process(&mut self.mem, self.engine.as_mut(), self.adapter.as_ref())?;
        self.adapter.setup(self.engine.as_mut())?;
        self.logger.info(format!("loaded ELF image, entry={:#x}", params.entry_addr));
        Ok(params)
    }

    pub fn load_baremetal(&mut self, program_args: Vec<String>, program_env: Vec<String>, manager: crate::baremetal::BaremetalManager) -> ArionResult<LoaderParams> {
        let loader = LinuxBaremetalLoader::new(program_args, program_env, manager);
        let params = loader.process(&mut self.mem, self.engine.as_mut(), self.adapter.as_ref())?;
        self.adapter.setup(self.engine.as_mut())?;
        self.logger.info(format!("loaded baremetal image, entry={:#x}", params.entry_addr));
        Ok(params)
    }

    /// Runs the next scheduling quantum for one runnable thread, dispatching
    /// any syscall interrupt the engine reports before yielding.
    pub fn step(&mut self) -> ArionResult<bool> {
        let Some(tid) = self.scheduler.next_runnable() else {
            return Ok(false);
        };

        let pc = self.adapter.read_reg(self.engine.as_ref(), crate::arch::LogicalReg::Pc).unwrap_or(0);
        let cycles = crate::types::ARION_CYCLES_PER_THREAD;
        let ran = self.engine.run(pc, cycles).unwrap_or(0);
        self.hooks.dispatch(HookCategory::Block, &HookEvent::Block { pc });

        if ran < cycles && self.adapter.syscall_intno() != 0 {
            let intno = self.adapter.syscall_intno();
            self.hooks.dispatch(HookCategory::Intr(intno), &HookEvent::Intr { intno });
            self.dispatch_pending_syscall(tid)?;
        }
        Ok(true)
    }

    fn dispatch_pending_syscall(&mut self, tid: u64) -> ArionResult<()> {
        let sysno = self.adapter.read_reg(self.engine.as_ref(), crate::arch::LogicalReg::SyscallNo)?;
        let mut args = [0u64; 6];
        for (i, a) in args.iter_mut().enumerate() {
            *a = self
                .adapter
                .read_reg(self.engine.as_ref(), crate::arch::LogicalReg::SyscallArg(i as u8))
                .unwrap_or(0);
        }
        let normalized = syscalls::arch_syscall_no(self.adapter.as_ref(), sysno);

        let pc = self.adapter.read_reg(self.engine.as_ref(), LogicalReg::Pc).unwrap_or(0);
        self.hooks.dispatch(HookCategory::Insn(sysno as u32), &HookEvent::Insn { pc, opcode: sysno as u32 });

        // FORK/EXECVE/a non-CLONE_THREAD CLONE(3) all need `&mut Arion` — to
        // spin up a whole new guest instance or wipe this one's own image —
        // which `SyscallContext` can't reach, so they're handled here
        // instead of falling through to `syscalls::dispatch`.
        let ret = if normalized == numbers::FORK || (normalized == numbers::CLONE && args[0] & CLONE_THREAD == 0) {
            match self.fork(tid) {
                Ok(child_pid) => child_pid as i64,
                Err(_) => -1, // ESRCH/ENOMEM-shaped failure; no child was created.
            }
        } else if normalized == numbers::CLONE3 {
            let flags = self.mem.read_val(self.engine.as_ref(), args[0], 8).unwrap_or(0);
            if flags & CLONE_THREAD == 0 {
                match self.fork(tid) {
                    Ok(child_pid) => child_pid as i64,
                    Err(_) => -1,
                }
            } else {
                self.run_syscall_dispatch(tid, normalized, args)
            }
        } else if normalized == numbers::EXECVE {
            match self.handle_execve(tid, args) {
                Ok(()) => 0,
                Err(_) => -2, // ENOENT-shaped failure: the new image couldn't be resolved.
            }
        } else {
            self.run_syscall_dispatch(tid, normalized, args)
        };

        self.adapter.write_reg(self.engine.as_mut(), crate::arch::LogicalReg::SyscallReturn, ret as u64)
    }

    fn run_syscall_dispatch(&mut self, tid: u64, normalized: u64, args: [u64; 6]) -> i64 {
        let mut ctx = SyscallContext {
            mem: &mut self.mem,
            engine: self.engine.as_mut(),
            adapter: self.adapter.as_ref(),
            fs: &mut self.fs,
            sockets: &mut self.sockets,
            signals: &mut self.signals,
            scheduler: &mut self.scheduler,
            hooks: &mut self.hooks,
            logger: &self.logger,
            config: &self.config,
            tid,
        };
        syscalls::dispatch(&mut ctx, normalized, args)
    }

    /// `fork(2)`/a non-`CLONE_THREAD` `clone`: spins up a whole independent
    /// guest instance — its own `ThreadScheduler`, its own deep copy of
    /// memory, fd table, socket table and signal state — rather than adding
    /// a row to this instance's own thread table (that's `CLONE_THREAD`'s
    /// job, handled entirely inside `ThreadScheduler::clone_thread`). The
    /// child joins this guest's [`ArionGroup`] rather than minting its own.
    pub fn fork(&mut self, tid: u64) -> ArionResult<u64> {
        let child_pid = self.scheduler.alloc_child_pid();
        let child_engine = self.engine.fork();
        let group = self.group.clone();
        let config = self.config.clone();
        let arch = self.arch;
        let mem = self.mem.clone();
        let fs = self.fs.clone();
        let sockets = self.sockets.clone();
        let signals = self.signals.clone();

        let child_handle: ArionHandle = Rc::new_cyclic(|weak| {
            let mut child_scheduler = ThreadScheduler::new();
            child_scheduler.spawn_main_thread_with_pid(child_pid);
            RefCell::new(Arion {
                pid: child_pid,
                logger: Logger::new(child_pid, config.log_lvl),
                config,
                arch,
                adapter: adapter_for(arch),
                engine: child_engine,
                mem,
                hooks: HooksEngine::new(),
                signals,
                fs,
                sockets,
                scheduler: child_scheduler,
                group: group.clone(),
                self_ref: GuestBackref(weak.clone()),
            })
        });

        self.hooks.dispatch(HookCategory::Fork, &HookEvent::Fork { parent_pid: self.pid, child_pid });
        group.borrow_mut().add_instance(child_handle.borrow().backref());

        {
            let mut child = child_handle.borrow_mut();
            let Arion { adapter, engine, .. } = &mut *child;
            // The child's own return value from `fork` is always 0; only the
            // parent sees the child's pid.
            adapter.write_reg(engine.as_mut(), crate::arch::LogicalReg::SyscallReturn, 0)?;
        }

        let _ = tid; // the thread-group-leader tid forked from; only its pid matters here.
        Ok(child_pid)
    }

    /// `execve(2)`: replaces this guest's own image, tearing down every
    /// other thread in its group the way `ThreadScheduler::execve_reset`
    /// already models, then fires the `Execve` hook. Actually reloading the
    /// resolved ELF at `path` is this crate's loader's job, invoked by the
    /// caller that owns the path resolution (this handler only resets the
    /// thread table and notifies hooks, matching `execve`'s previous
    /// dispatcher-level behavior).
    fn handle_execve(&mut self, tid: u64, args: [u64; 6]) -> ArionResult<()> {
        let path = self.mem.read_c_string(self.engine.as_ref(), args[0], 4096).unwrap_or_default();
        self.scheduler.execve_reset(tid)?;
        self.hooks.dispatch(HookCategory::Execve, &HookEvent::Execve { pid: self.pid, path });
        Ok(())
    }

    /// Drives `step` until no thread is runnable or the caller stops it.
    pub fn run(&mut self) -> ArionResult<()> {
        while self.step()? {}
        Ok(())
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
        self.engine.stop();
    }

    /// Captures a byte-serializable snapshot of this instance's state —
    /// never a pointer back into live managers.
    pub fn snapshot(&self) -> ArionResult<ContextSnapshot> {
        let mut regions = Vec::new();
        for m in self.mem.get_mappings() {
            let bytes = self.mem.read(self.engine.as_ref(), m.start, m.size() as usize)?;
            regions.push(MemoryRegionSnapshot {
                start: m.start,
                end: m.end,
                perm_bits: perms_to_bits(m.perms),
                label: m.label.clone(),
                bytes,
            });
        }
        Ok(ContextSnapshot {
            pid: self.pid,
            regs: std::collections::HashMap::new(),
            regions,
            files: self.fs.files.values().cloned().collect(),
            sockets: self.sockets.sockets.values().cloned().collect(),
            cwd_path: self.fs.get_cwd_path().to_string(),
        })
    }

    pub fn restore(&mut self, snap: &ContextSnapshot) -> ArionResult<()> {
        for region in &snap.regions {
            self.mem.map(region.start, region.end - region.start, bits_to_perms(region.perm_bits), region.label.clone())?;
            self.mem.write(self.engine.as_mut(), region.start, &region.bytes)?;
        }
        for file in &snap.files {
            self.fs.add_file_entry(file.fd, file.clone(), false)?;
        }
        for sock in &snap.sockets {
            self.sockets.add_socket_entry(sock.fd, sock.clone());
        }
        self.fs.set_cwd_path(snap.cwd_path.clone());
        Ok(())
    }

    /// GDB remote-protocol serving is explicitly out of this crate's core
    /// scope; this stub preserves the surface method a caller would look for
    /// without pretending to implement the protocol.
    pub fn run_gdbserver(&mut self, _port: u16) -> ArionResult<()> {
        Err(ArionError::Config("gdbserver support is not built into this crate".into()))
    }
}

//! Cooperative thread/process scheduler.
//!
//! Grounded on `include/arion/common/arion_group.hpp`'s thread/process table
//! a single guest instance round-robins across: one shared CPU engine runs
//! each runnable thread for `ARION_CYCLES_PER_THREAD` cycles before
//! preempting to the next, and `clone(2)` (`CLONE_THREAD`) adds a table entry
//! sharing the existing pid. A `fork(2)` spins up a whole separate guest
//! instance instead — see [`crate::guest::ArionGroup`] — so this table only
//! ever allocates the new pid for one (`ThreadScheduler::alloc_child_pid`),
//! it doesn't seat a thread for it.
//! Generalizes `nvm/src/scheduler.rs`'s `RoundRobinScheduler` (a `VecDeque` of
//! ready vcpu ids) from a fixed vCPU count to a dynamically growing/shrinking
//! thread table with explicit blocked states.

use crate::error::{ArionResult, SchedError};
use crate::types::ARION_CYCLES_PER_THREAD;
use std::collections::VecDeque;

/// Why a thread isn't currently runnable. Modeled as explicit state rather
/// than a suspended coroutine/continuation: this crate runs on one host
/// thread, so "blocked" just means "skip it when scheduling".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockedOn {
    Futex(u64),
    Wait { target_tid: Option<u64> },
    Sigwait,
    Zombie { exit_code: i32 },
}

#[derive(Debug, Clone)]
pub struct ThreadSlot {
    pub tid: u64,
    pub pid: u64,
    pub blocked: Option<BlockedOn>,
    pub cycles_run: u64,
}

impl ThreadSlot {
    pub fn is_runnable(&self) -> bool {
        self.blocked.is_none()
    }

    pub fn is_zombie(&self) -> bool {
        matches!(self.blocked, Some(BlockedOn::Zombie { .. }))
    }
}

#[derive(Default)]
pub struct ThreadScheduler {
    threads: Vec<ThreadSlot>,
    run_queue: VecDeque<u64>,
    next_tid: u64,
    next_pid: u64,
    stopped: bool,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        Self {
            threads: Vec::new(),
            run_queue: VecDeque::new(),
            next_tid: crate::types::ARION_PROCESS_PID,
            next_pid: crate::types::ARION_PROCESS_PID,
            stopped: false,
        }
    }

    /// Spawns the first thread of a brand new process (its tid equals its
    /// pid, matching Linux's thread-group-leader convention).
    pub fn spawn_main_thread(&mut self) -> u64 {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.next_tid = self.next_tid.max(pid + 1);
        self.threads.push(ThreadSlot {
            tid: pid,
            pid,
            blocked: None,
            cycles_run: 0,
        });
        self.run_queue.push_back(pid);
        pid
    }

    /// Reserves a brand new pid for a `fork(2)` child without seating a
    /// thread for it here — the child gets its own `ThreadScheduler` in its
    /// own guest instance, seeded via [`Self::spawn_main_thread_with_pid`].
    pub fn alloc_child_pid(&mut self) -> u64 {
        let pid = self.next_pid;
        self.next_pid += 1;
        self.next_tid = self.next_tid.max(pid + 1);
        pid
    }

    /// Seats a forked child's main thread under a pid allocated by the
    /// parent's [`Self::alloc_child_pid`], rather than generating its own.
    pub fn spawn_main_thread_with_pid(&mut self, pid: u64) -> u64 {
        self.next_pid = self.next_pid.max(pid + 1);
        self.next_tid = self.next_tid.max(pid + 1);
        self.threads.push(ThreadSlot {
            tid: pid,
            pid,
            blocked: None,
            cycles_run: 0,
        });
        self.run_queue.push_back(pid);
        pid
    }

    /// Unblocks `tid` if it's currently sigwait-parked; a no-op otherwise.
    pub fn wake_sigwait(&mut self, tid: u64) -> ArionResult<()> {
        let t = self.thread_mut(tid)?;
        if matches!(t.blocked, Some(BlockedOn::Sigwait)) {
            t.blocked = None;
            self.run_queue.push_back(tid);
        }
        Ok(())
    }

    /// `clone(2)` with `CLONE_THREAD`: a new tid sharing the parent's pid.
    pub fn clone_thread(&mut self, parent_tid: u64) -> ArionResult<u64> {
        let pid = self.thread(parent_tid)?.pid;
        let tid = self.next_tid;
        self.next_tid += 1;
        self.threads.push(ThreadSlot {
            tid,
            pid,
            blocked: None,
            cycles_run: 0,
        });
        self.run_queue.push_back(tid);
        Ok(tid)
    }

    /// `execve(2)`: the calling thread's image is replaced, every other
    /// thread in its thread group is torn down.
    pub fn execve_reset(&mut self, tid: u64) -> ArionResult<()> {
        let pid = self.thread(tid)?.pid;
        self.threads.retain(|t| t.pid != pid || t.tid == tid);
        self.run_queue.retain(|&t| t == tid);
        if let Some(t) = self.threads.iter_mut().find(|t| t.tid == tid) {
            t.blocked = None;
            t.cycles_run = 0;
        }
        if !self.run_queue.contains(&tid) {
            self.run_queue.push_back(tid);
        }
        Ok(())
    }

    fn thread(&self, tid: u64) -> ArionResult<&ThreadSlot> {
        self.threads.iter().find(|t| t.tid == tid).ok_or(SchedError::NoSuchThread(tid, tid).into())
    }

    fn thread_mut(&mut self, tid: u64) -> ArionResult<&mut ThreadSlot> {
        self.threads.iter_mut().find(|t| t.tid == tid).ok_or(SchedError::NoSuchThread(tid, tid).into())
    }

    pub fn has_thread(&self, tid: u64) -> bool {
        self.threads.iter().any(|t| t.tid == tid)
    }

    pub fn threads(&self) -> &[ThreadSlot] {
        &self.threads
    }

    pub fn block_on_futex(&mut self, tid: u64, addr: u64) -> ArionResult<()> {
        self.thread_mut(tid)?.blocked = Some(BlockedOn::Futex(addr));
        Ok(())
    }

    /// `FUTEX_WAKE`: unblocks up to `max` threads parked on `addr`, returning
    /// how many were actually woken.
    pub fn wake_futex(&mut self, addr: u64, max: u32) -> u32 {
        let mut woken = 0;
        for t in self.threads.iter_mut() {
            if woken >= max {
                break;
            }
            if t.blocked == Some(BlockedOn::Futex(addr)) {
                t.blocked = None;
                self.run_queue.push_back(t.tid);
                woken += 1;
            }
        }
        woken
    }

    pub fn block_on_wait(&mut self, waiter_tid: u64, target_tid: Option<u64>) -> ArionResult<()> {
        self.thread_mut(waiter_tid)?.blocked = Some(BlockedOn::Wait { target_tid });
        Ok(())
    }

    pub fn block_on_sigwait(&mut self, tid: u64) -> ArionResult<()> {
        self.thread_mut(tid)?.blocked = Some(BlockedOn::Sigwait);
        Ok(())
    }

    /// Marks `tid` exited; wakes any thread parked in `wait4`/`waitid`
    /// targeting it or targeting "any child" (`target_tid: None`).
    pub fn exit_thread(&mut self, tid: u64, exit_code: i32) -> ArionResult<Vec<u64>> {
        self.thread_mut(tid)?.blocked = Some(BlockedOn::Zombie { exit_code });
        self.run_queue.retain(|&t| t != tid);
        let mut woken = Vec::new();
        for t in self.threads.iter_mut() {
            let matches = match &t.blocked {
                Some(BlockedOn::Wait { target_tid: Some(target) }) => *target == tid,
                Some(BlockedOn::Wait { target_tid: None }) => true,
                _ => false,
            };
            if matches {
                t.blocked = None;
                self.run_queue.push_back(t.tid);
                woken.push(t.tid);
            }
        }
        Ok(woken)
    }

    /// `wait4`/`waitid`: reaps a zombie thread matching `target_tid` (or any
    /// zombie, if `None`), returning its exit code. Leaves the caller's own
    /// blocked state alone — the syscall dispatcher decides whether to park
    /// it via [`Self::block_on_wait`] first.
    pub fn reap(&mut self, target_tid: Option<u64>) -> Option<(u64, i32)> {
        let idx = self.threads.iter().position(|t| match (&t.blocked, target_tid) {
            (Some(BlockedOn::Zombie { .. }), Some(target)) => t.tid == target,
            (Some(BlockedOn::Zombie { .. }), None) => true,
            _ => false,
        })?;
        let slot = self.threads.remove(idx);
        match slot.blocked {
            Some(BlockedOn::Zombie { exit_code }) => Some((slot.tid, exit_code)),
            _ => unreachable!(),
        }
    }

    /// Advances `ARION_CYCLES_PER_THREAD` worth of scheduling quantum for the
    /// next runnable thread in round-robin order, or `None` if nothing is
    /// runnable.
    pub fn next_runnable(&mut self) -> Option<u64> {
        if self.stopped {
            return None;
        }
        let len = self.run_queue.len();
        for _ in 0..len {
            let tid = self.run_queue.pop_front()?;
            match self.threads.iter_mut().find(|t| t.tid == tid) {
                Some(t) if t.is_runnable() => {
                    t.cycles_run += ARION_CYCLES_PER_THREAD;
                    self.run_queue.push_back(tid);
                    return Some(tid);
                }
                Some(_) => continue,
                None => continue,
            }
        }
        None
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

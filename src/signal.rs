//! Guest signal delivery.
//!
//! Grounded on `include/arion/common/signal_manager.hpp`'s `SignalManager`:
//! sigaction table, `sigwait_list`, `ucontext_regs` stack for `sigreturn`.

use crate::error::{ArionResult, SignalError};
use crate::types::Signal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

pub const SIGHUP: i32 = 1;
pub const SIGINT: i32 = 2;
pub const SIGQUIT: i32 = 3;
pub const SIGILL: i32 = 4;
pub const SIGTRAP: i32 = 5;
pub const SIGABRT: i32 = 6;
pub const SIGBUS: i32 = 7;
pub const SIGFPE: i32 = 8;
pub const SIGKILL: i32 = 9;
pub const SIGSEGV: i32 = 11;
pub const SIGPIPE: i32 = 13;
pub const SIGALRM: i32 = 14;
pub const SIGTERM: i32 = 15;
pub const SIGCHLD: i32 = 17;
pub const SIGCONT: i32 = 18;
pub const SIGSTOP: i32 = 19;
pub const SIGURG: i32 = 23;
pub const SIGWINCH: i32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Terminate,
    Ignore,
    Stop,
    Handle,
}

pub fn default_disposition(signo: i32) -> Disposition {
    match signo {
        SIGCHLD | SIGURG | SIGWINCH => Disposition::Ignore,
        SIGSTOP | SIGTSTP_COMPAT => Disposition::Stop,
        _ => Disposition::Terminate,
    }
}
// SIGTSTP isn't in the core set this crate names explicitly but the default
// table still needs a name to match against; alias it locally.
const SIGTSTP_COMPAT: i32 = 20;

/// Layout mirrors the kernel's `sigaction`/`ksigaction` for the guest arch
/// closely enough for `rt_sigaction` round trips (handler/flags/mask/restorer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KSigAction {
    pub handler_addr: u64,
    pub flags: u64,
    pub mask: u64,
    pub restorer_addr: u64,
}

/// A saved pre-handler register context, pushed when a handler is invoked
/// and popped by `sigreturn`.
#[derive(Debug, Clone, Default)]
pub struct SavedFrame {
    pub regs: HashMap<u64, u64>,
    pub source_pid: u64,
    pub signo: i32,
}

#[derive(Default, Clone)]
pub struct SignalManager {
    sighandlers: HashMap<i32, KSigAction>,
    pending: VecDeque<Signal>,
    /// target_tid -> (waiter_pid, status_write_addr)
    sigwait_list: HashMap<u64, (u64, u64)>,
    frame_stack: Vec<SavedFrame>,
}

impl SignalManager {
    pub fn initialize() -> Self {
        Self::default()
    }

    pub fn has_sighandler(&self, signo: i32) -> bool {
        self.sighandlers.contains_key(&signo)
    }

    pub fn get_sighandler(&self, signo: i32) -> Option<&KSigAction> {
        self.sighandlers.get(&signo)
    }

    pub fn set_sighandler(&mut self, signo: i32, action: KSigAction) {
        self.sighandlers.insert(signo, action);
    }

    pub fn queue_signal(&mut self, source_pid: u64, signo: i32) {
        self.pending.push_back(Signal { source_pid, signo });
    }

    pub fn next_pending(&mut self) -> Option<Signal> {
        self.pending.pop_front()
    }

    /// `handle_signal(source_pid, signo)`: if a handler is installed, saves
    /// `regs` as the pre-handler context and returns `Disposition::Handle`
    /// (the caller writes a signal frame on the guest stack and sets PC to
    /// the handler); otherwise returns the default disposition. The second
    /// element is `Some((waiter_pid, status_write_addr))` when this signal
    /// resolved a parked `sigwait`, which the caller must unblock.
    pub fn handle_signal(&mut self, source_pid: u64, signo: i32, regs: HashMap<u64, u64>) -> (Disposition, Option<(u64, u64)>) {
        if self.has_sighandler(signo) {
            self.frame_stack.push(SavedFrame { regs, source_pid, signo });
            return (Disposition::Handle, None);
        }
        let disp = default_disposition(signo);
        let woken = if signo == SIGCHLD { self.resolve_sigwait(source_pid) } else { None };
        (disp, woken)
    }

    /// `sigreturn()`: pops the most recently saved frame and returns the
    /// register context it should restore, or an error if the stack is empty.
    pub fn sigreturn(&mut self) -> ArionResult<SavedFrame> {
        self.frame_stack.pop().ok_or(SignalError::NoPendingFrame.into())
    }

    pub fn wait_for_sig(&mut self, target_tid: u64, waiter_pid: u64, status_write_addr: u64) {
        self.sigwait_list.insert(target_tid, (waiter_pid, status_write_addr));
    }

    /// Called when `target_tid`'s owning thread exits; returns the
    /// `(waiter_pid, status_write_addr)` a parked `wait4`/`waitid` should
    /// now complete against, if any.
    pub fn resolve_sigwait(&mut self, target_tid: u64) -> Option<(u64, u64)> {
        self.sigwait_list.remove(&target_tid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigchld_defaults_to_ignore() {
        assert_eq!(default_disposition(SIGCHLD), Disposition::Ignore);
    }

    #[test]
    fn sigsegv_defaults_to_terminate() {
        assert_eq!(default_disposition(SIGSEGV), Disposition::Terminate);
    }

    #[test]
    fn handler_presence_flips_disposition_to_handle() {
        let mut sm = SignalManager::initialize();
        sm.set_sighandler(SIGSEGV, KSigAction { handler_addr: 0x1000, ..Default::default() });
        let (disp, woken) = sm.handle_signal(1, SIGSEGV, HashMap::new());
        assert_eq!(disp, Disposition::Handle);
        assert_eq!(woken, None);
    }

    #[test]
    fn sigchld_resolves_a_parked_sigwait() {
        let mut sm = SignalManager::initialize();
        sm.wait_for_sig(42, 7, 0x8000);
        let (disp, woken) = sm.handle_signal(42, SIGCHLD, HashMap::new());
        assert_eq!(disp, Disposition::Ignore);
        assert_eq!(woken, Some((7, 0x8000)));
        assert_eq!(sm.resolve_sigwait(42), None);
    }

    #[test]
    fn sigreturn_without_handler_invocation_errors() {
        let mut sm = SignalManager::initialize();
        assert!(sm.sigreturn().is_err());
    }

    #[test]
    fn sigreturn_restores_saved_frame() {
        let mut sm = SignalManager::initialize();
        sm.set_sighandler(SIGTERM, KSigAction::default());
        let mut regs = HashMap::new();
        regs.insert(0u64, 0x42u64);
        let _ = sm.handle_signal(2, SIGTERM, regs);
        let frame = sm.sigreturn().unwrap();
        assert_eq!(frame.regs.get(&0), Some(&0x42));
        assert_eq!(frame.signo, SIGTERM);
    }
}

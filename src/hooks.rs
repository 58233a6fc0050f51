//! Hooks engine: registration/dispatch of user callbacks on CPU and guest
//! lifecycle events.
//!
//! Grounded on `nvm/src/cpu.rs`'s `VirtualCpu::event_hooks`/`record_event`
//! (a `Vec<Box<dyn Fn(&CpuEvent) + Send + Sync>>` invoked in registration
//! order, then appended to a ring-buffer trace) generalized from CPU-only
//! events to a full category set: code, block, syscall, memory, and signal.

use crate::types::Addr;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookCategory {
    Code,
    Block,
    Insn(u32),
    Intr(u32),
    MemInvalid,
    MemRead,
    MemWrite,
    MemFetch,
    Syscall,
    Fork,
    Execve,
}

/// The event payload delivered to a registered callback. Mirrors the shape
/// of `nvm/src/debugger.rs`'s `DebugEvent::SyscallEntry`/`SyscallExit`
/// variants for the syscall case, extended to the other categories.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Code { pc: Addr },
    Block { pc: Addr },
    Insn { pc: Addr, opcode: u32 },
    Intr { intno: u32 },
    MemAccess { addr: Addr, size: usize, is_write: bool, valid: bool },
    Syscall { sysno: u64, args: [u64; 6] },
    Fork { parent_pid: u64, child_pid: u64 },
    Execve { pid: u64, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(u64);

type HookFn = Box<dyn FnMut(&HookEvent) + Send>;

#[derive(Default)]
pub struct HooksEngine {
    next_id: u64,
    hooks: HashMap<HookCategory, Vec<(HookId, HookFn)>>,
    /// A `syscall` hook can claim a call as `handled`, suppressing the
    /// dispatcher's default handler.
    pub syscall_handled: bool,
}

impl HooksEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook<F>(&mut self, category: HookCategory, callback: F) -> HookId
    where
        F: FnMut(&HookEvent) + Send + 'static,
    {
        self.next_id += 1;
        let id = HookId(self.next_id);
        self.hooks.entry(category).or_default().push((id, Box::new(callback)));
        id
    }

    /// Removes a previously registered hook by id, regardless of category.
    pub fn unhook(&mut self, id: HookId) {
        for handlers in self.hooks.values_mut() {
            handlers.retain(|(hid, _)| *hid != id);
        }
    }

    pub fn has_hooks(&self, category: HookCategory) -> bool {
        self.hooks.get(&category).map_or(false, |v| !v.is_empty())
    }

    /// Dispatches `event` to every hook registered for `category`, in
    /// registration order.
    pub fn dispatch(&mut self, category: HookCategory, event: &HookEvent) {
        if category == HookCategory::Syscall {
            self.syscall_handled = false;
        }
        if let Some(handlers) = self.hooks.get_mut(&category) {
            for (_, cb) in handlers.iter_mut() {
                cb(event);
            }
        }
    }

    pub fn mark_syscall_handled(&mut self) {
        self.syscall_handled = true;
    }

    pub fn count(&self, category: HookCategory) -> usize {
        self.hooks.get(&category).map_or(0, |v| v.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn hook_idempotence_unhook_matches_never_registered() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut engine = HooksEngine::new();
        let c = calls.clone();
        let id = engine.hook(HookCategory::Code, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        engine.unhook(id);
        engine.dispatch(HookCategory::Code, &HookEvent::Code { pc: 0x1000 });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multiple_hooks_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut engine = HooksEngine::new();
        let o1 = order.clone();
        engine.hook(HookCategory::Block, move |_| o1.lock().unwrap().push(1));
        let o2 = order.clone();
        engine.hook(HookCategory::Block, move |_| o2.lock().unwrap().push(2));
        engine.dispatch(HookCategory::Block, &HookEvent::Block { pc: 0 });
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn syscall_hook_can_claim_handled() {
        let mut engine = HooksEngine::new();
        engine.hook(HookCategory::Syscall, |_| {});
        engine.dispatch(HookCategory::Syscall, &HookEvent::Syscall { sysno: 1, args: [0; 6] });
        assert!(!engine.syscall_handled);
        engine.mark_syscall_handled();
        assert!(engine.syscall_handled);
    }
}

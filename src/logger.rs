//! Per-guest logging, backed by the `log` facade crate.
//!
//! Grounded on `include/arion/common/logger.hpp`'s `Logger` class: a
//! process-wide id allocator with a free-list, and a thin per-guest wrapper
//! that tags every line with the owning pid/tid and enforces its own level
//! independent of the global `log` max level.

use crate::config::LogLevel;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static FREE_IDS: Mutex<Vec<u64>> = Mutex::new(Vec::new());

fn alloc_id() -> u64 {
    if let Some(id) = FREE_IDS.lock().pop() {
        return id;
    }
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

fn free_id(id: u64) {
    FREE_IDS.lock().push(id);
}

/// A per-guest logger. One is created per `Arion` instance and dropped (and
/// its id recycled) when the instance is destroyed.
pub struct Logger {
    id: u64,
    pid: u64,
    tid: u64,
    lvl: LogLevel,
}

impl Logger {
    pub fn new(pid: u64, lvl: LogLevel) -> Self {
        Self {
            id: alloc_id(),
            pid,
            tid: pid,
            lvl,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn set_tid(&mut self, tid: u64) {
        self.tid = tid;
    }

    pub fn set_log_level(&mut self, lvl: LogLevel) {
        self.lvl = lvl;
    }

    pub fn get_log_level(&self) -> LogLevel {
        self.lvl
    }

    fn enabled(&self, at: LogLevel) -> bool {
        self.lvl != LogLevel::Off && at >= self.lvl
    }

    fn prefix(&self) -> String {
        format!("[arion#{} pid={} tid={}]", self.id, self.pid, self.tid)
    }

    pub fn trace(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Trace) {
            log::trace!("{} {}", self.prefix(), msg.as_ref());
        }
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Debug) {
            log::debug!("{} {}", self.prefix(), msg.as_ref());
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Info) {
            log::info!("{} {}", self.prefix(), msg.as_ref());
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Warn) {
            log::warn!("{} {}", self.prefix(), msg.as_ref());
        }
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Error) {
            log::error!("{} {}", self.prefix(), msg.as_ref());
        }
    }

    pub fn critical(&self, msg: impl AsRef<str>) {
        if self.enabled(LogLevel::Critical) {
            log::error!("{} CRITICAL: {}", self.prefix(), msg.as_ref());
        }
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        free_id(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_recycled() {
        let first_id = {
            let l = Logger::new(100, LogLevel::Info);
            l.id()
        };
        let second = Logger::new(100, LogLevel::Info);
        assert_eq!(second.id(), first_id);
    }

    #[test]
    fn off_suppresses_everything() {
        let l = Logger::new(1, LogLevel::Off);
        assert!(!l.enabled(LogLevel::Critical));
    }
}

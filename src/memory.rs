//! Guest memory manager: page-aligned mappings with permissions, and the
//! guest-host byte transfer primitives every other component reads/writes
//! guest state through.
//!
//! Grounded on `nvm/src/memory.rs`'s `AddressSpace`/`PhysicalMemory` (a
//! sorted `Vec` of regions behind one dispatch point) generalized from a
//! physical-RAM-plus-MMIO bus into a guest-virtual, permission-tagged
//! mapping table. Unlike a plain RAM model, a guest mapping has no backing
//! host memory of its own here — `read`/`write` go through the (out-of-scope)
//! CPU emulator engine, represented by the [`crate::engine::CpuEngine`] trait.

use crate::engine::CpuEngine;
use crate::error::{ArionResult, MemError};
use crate::types::{Addr, ARION_SYSTEM_PAGE_SZ};
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perms: u8 {
        const R = 0b001;
        const W = 0b010;
        const X = 0b100;
        const RW = Self::R.bits() | Self::W.bits();
        const RX = Self::R.bits() | Self::X.bits();
        const RWX = Self::R.bits() | Self::W.bits() | Self::X.bits();
    }
}

#[derive(Debug, Clone)]
pub struct Mapping {
    pub start: Addr,
    pub end: Addr,
    pub perms: Perms,
    pub label: String,
}

impl Mapping {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.start && addr < self.end
    }
}

fn align_down(v: u64) -> u64 {
    v & !(ARION_SYSTEM_PAGE_SZ - 1)
}

fn align_up(v: u64) -> u64 {
    align_down(v + ARION_SYSTEM_PAGE_SZ - 1)
}

pub fn is_page_aligned(v: u64) -> bool {
    v % ARION_SYSTEM_PAGE_SZ == 0
}

/// Default bottom-up search base for hint-less `map()` calls, arch-independent
/// here (the Arch Adapter narrows this per architecture when wiring the loader).
pub const DEFAULT_MMAP_BASE: Addr = 0x0000_7000_0000_0000;

#[derive(Clone)]
pub struct MemoryManager {
    mappings: Vec<Mapping>,
    mmap_base: Addr,
}

impl MemoryManager {
    pub fn new(mmap_base: Addr) -> Self {
        Self {
            mappings: Vec::new(),
            mmap_base,
        }
    }

    fn find_index_containing(&self, addr: Addr) -> Option<usize> {
        self.mappings.iter().position(|m| m.contains(addr))
    }

    fn overlaps_any(&self, start: Addr, end: Addr) -> bool {
        self.mappings.iter().any(|m| start < m.end && end > m.start)
    }

    fn find_free_hole(&self, size: u64) -> Option<Addr> {
        let mut sorted: Vec<&Mapping> = self.mappings.iter().collect();
        sorted.sort_by_key(|m| m.start);
        let mut cursor = self.mmap_base;
        for m in sorted {
            if m.start >= cursor && m.start - cursor >= size {
                return Some(cursor);
            }
            if m.end > cursor {
                cursor = m.end;
            }
        }
        Some(cursor)
    }

    /// `map(addr_hint, size, perms, label) -> actual_addr`.
    pub fn map(&mut self, addr_hint: Addr, size: u64, perms: Perms, label: impl Into<String>) -> ArionResult<Addr> {
        let size = align_up(size.max(1));
        let start = if addr_hint == 0 {
            self.find_free_hole(size)
                .ok_or(MemError::MemoryExhausted { requested: size as usize })?
        } else {
            let hint = align_down(addr_hint);
            if self.overlaps_any(hint, hint + size) {
                // MAP_FIXED-style: unmap the overlapping region(s) first.
                self.unmap(hint, size)?;
            }
            hint
        };
        let end = start + size;
        self.mappings.push(Mapping {
            start,
            end,
            perms,
            label: label.into(),
        });
        Ok(start)
    }

    /// `unmap(addr, size)`, splitting a containing mapping into at most two.
    pub fn unmap(&mut self, addr: Addr, size: u64) -> ArionResult<()> {
        let start = align_down(addr);
        let end = align_up(addr + size.max(1));
        let mut result = Vec::with_capacity(self.mappings.len());
        for m in self.mappings.drain(..) {
            if end <= m.start || start >= m.end {
                result.push(m);
                continue;
            }
            if start > m.start {
                result.push(Mapping {
                    start: m.start,
                    end: start,
                    perms: m.perms,
                    label: m.label.clone(),
                });
            }
            if end < m.end {
                result.push(Mapping {
                    start: end,
                    end: m.end,
                    perms: m.perms,
                    label: m.label.clone(),
                });
            }
        }
        self.mappings = result;
        Ok(())
    }

    /// `protect(addr, size, perms)`.
    pub fn protect(&mut self, addr: Addr, size: u64, perms: Perms) -> ArionResult<()> {
        let start = align_down(addr);
        let end = align_up(addr + size.max(1));
        let mut result = Vec::with_capacity(self.mappings.len() + 2);
        for m in self.mappings.drain(..) {
            if end <= m.start || start >= m.end {
                result.push(m);
                continue;
            }
            if start > m.start {
                result.push(Mapping {
                    start: m.start,
                    end: start,
                    perms: m.perms,
                    label: m.label.clone(),
                });
            }
            let mid_start = start.max(m.start);
            let mid_end = end.min(m.end);
            result.push(Mapping {
                start: mid_start,
                end: mid_end,
                perms,
                label: m.label.clone(),
            });
            if end < m.end {
                result.push(Mapping {
                    start: end,
                    end: m.end,
                    perms: m.perms,
                    label: m.label,
                });
            }
        }
        self.mappings = result;
        Ok(())
    }

    pub fn is_mapped(&self, addr: Addr) -> bool {
        self.find_index_containing(addr).is_some()
    }

    fn mapping_covering(&self, addr: Addr, len: usize, need: Perms) -> ArionResult<&Mapping> {
        let m = self
            .mappings
            .iter()
            .find(|m| m.contains(addr))
            .ok_or(MemError::NotMapped(addr))?;
        let end = addr + len as u64;
        if end > m.end || !m.perms.contains(need) {
            return Err(MemError::InvalidAccess { addr, len }.into());
        }
        Ok(m)
    }

    pub fn read(&self, engine: &dyn CpuEngine, addr: Addr, len: usize) -> ArionResult<Vec<u8>> {
        self.mapping_covering(addr, len, Perms::R)?;
        engine
            .mem_read(addr, len)
            .map_err(|_| MemError::InvalidAccess { addr, len }.into())
    }

    pub fn write(&self, engine: &mut dyn CpuEngine, addr: Addr, bytes: &[u8]) -> ArionResult<()> {
        self.mapping_covering(addr, bytes.len(), Perms::W)?;
        engine
            .mem_write(addr, bytes)
            .map_err(|_| MemError::InvalidAccess { addr, len: bytes.len() }.into())
    }

    pub fn read_val(&self, engine: &dyn CpuEngine, addr: Addr, width: usize) -> ArionResult<u64> {
        let bytes = self.read(engine, addr, width)?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_val(&self, engine: &mut dyn CpuEngine, addr: Addr, v: u64, width: usize) -> ArionResult<()> {
        let buf = v.to_le_bytes();
        self.write(engine, addr, &buf[..width])
    }

    pub fn read_ptr(&self, engine: &dyn CpuEngine, addr: Addr, ptr_width: usize) -> ArionResult<u64> {
        self.read_val(engine, addr, ptr_width)
    }

    pub fn write_ptr(&self, engine: &mut dyn CpuEngine, addr: Addr, v: u64, ptr_width: usize) -> ArionResult<()> {
        self.write_val(engine, addr, v, ptr_width)
    }

    pub fn read_c_string(&self, engine: &dyn CpuEngine, addr: Addr, max: usize) -> ArionResult<String> {
        let mut out = Vec::new();
        let mut cur = addr;
        loop {
            if out.len() >= max {
                return Err(MemError::StringTooLong { addr, max }.into());
            }
            let byte = self.read(engine, cur, 1)?[0];
            if byte == 0 {
                break;
            }
            out.push(byte);
            cur += 1;
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    pub fn write_string(&self, engine: &mut dyn CpuEngine, addr: Addr, s: &str) -> ArionResult<()> {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.write(engine, addr, &bytes)
    }

    pub fn get_mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn mappings_str(&self) -> String {
        let mut sorted: Vec<&Mapping> = self.mappings.iter().collect();
        sorted.sort_by_key(|m| m.start);
        sorted
            .into_iter()
            .map(|m| {
                format!(
                    "{:016x}-{:016x} {}{}{} {}",
                    m.start,
                    m.end,
                    if m.perms.contains(Perms::R) { 'r' } else { '-' },
                    if m.perms.contains(Perms::W) { 'w' } else { '-' },
                    if m.perms.contains(Perms::X) { 'x' } else { '-' },
                    m.label,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_aligns_hint_and_size() {
        let mut mm = MemoryManager::new(DEFAULT_MMAP_BASE);
        let addr = mm.map(0x1001, 0x10, Perms::R, "x").unwrap();
        assert_eq!(addr, 0x1000);
        assert_eq!(mm.get_mappings()[0].size(), 0x1000);
    }

    #[test]
    fn no_overlap_invariant_after_adjacent_maps() {
        let mut mm = MemoryManager::new(DEFAULT_MMAP_BASE);
        let a = mm.map(0, 0x1000, Perms::R, "a").unwrap();
        let b = mm.map(0, 0x1000, Perms::R, "b").unwrap();
        assert_ne!(a, b);
        assert!(!mm.is_mapped(b + 0x1000));
    }

    #[test]
    fn unmap_splits_containing_mapping() {
        let mut mm = MemoryManager::new(DEFAULT_MMAP_BASE);
        let start = mm.map(0x1000, 0x3000, Perms::R, "r").unwrap();
        mm.unmap(start + 0x1000, 0x1000).unwrap();
        assert!(mm.is_mapped(start));
        assert!(!mm.is_mapped(start + 0x1000));
        assert!(mm.is_mapped(start + 0x2000));
    }

    #[test]
    fn fixed_hint_overlap_unmaps_first() {
        let mut mm = MemoryManager::new(DEFAULT_MMAP_BASE);
        mm.map(0x5000, 0x2000, Perms::R, "old").unwrap();
        let addr = mm.map(0x5000, 0x1000, Perms::RW, "new").unwrap();
        assert_eq!(addr, 0x5000);
        assert_eq!(mm.get_mappings().len(), 2);
    }
}

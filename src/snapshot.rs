//! Context snapshots.
//!
//! Grounded on `include/arion/common/arion_context.hpp`'s `ArionContext`
//! save/restore pair: a snapshot holds serialized state only — memory
//! contents, register values, fd tables — never a pointer back into a live
//! manager, so it can outlive the `Arion` instance that produced it.
//! `serde_json` stands in for a hand-rolled `serialize_arion_file`/
//! `deserialize_arion_file` byte-vector pair.

use crate::error::ArionResult;
use crate::fs::ArionFile;
use crate::memory::Perms;
use crate::socket::ArionSocket;
use crate::types::Addr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRegionSnapshot {
    pub start: Addr,
    pub end: Addr,
    pub perm_bits: u8,
    pub label: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub pid: u64,
    pub regs: HashMap<u64, u64>,
    pub regions: Vec<MemoryRegionSnapshot>,
    pub files: Vec<ArionFile>,
    pub sockets: Vec<ArionSocket>,
    pub cwd_path: String,
}

impl ContextSnapshot {
    /// Serializes to the on-disk/transport representation — the "context
    /// snapshot" external interface.
    pub fn to_bytes(&self) -> ArionResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::error::ArionError::Config(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> ArionResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::error::ArionError::Config(e.to_string()))
    }
}

/// Mirrors a `Perms` bitmask into the plain `u8` a snapshot stores, so
/// `snapshot.rs` doesn't need `memory.rs`'s bitflags type to implement serde.
pub fn perms_to_bits(perms: Perms) -> u8 {
    perms.bits()
}

pub fn bits_to_perms(bits: u8) -> Perms {
    Perms::from_bits_truncate(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut regs = HashMap::new();
        regs.insert(0, 0x1234);
        let snap = ContextSnapshot {
            pid: 1,
            regs,
            regions: vec![MemoryRegionSnapshot {
                start: 0x1000,
                end: 0x2000,
                perm_bits: perms_to_bits(Perms::RX),
                label: "[load]".into(),
                bytes: vec![0x90; 0x1000],
            }],
            files: vec![ArionFile::new(0, "/dev/stdin", 0, 0)],
            sockets: vec![],
            cwd_path: "/".into(),
        };
        let bytes = snap.to_bytes().unwrap();
        let restored = ContextSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(restored.pid, 1);
        assert_eq!(restored.regs.get(&0), Some(&0x1234));
        assert_eq!(restored.regions[0].bytes.len(), 0x1000);
        assert_eq!(bits_to_perms(restored.regions[0].perm_bits), Perms::RX);
    }

    #[test]
    fn malformed_bytes_error_instead_of_panicking() {
        assert!(ContextSnapshot::from_bytes(b"not json").is_err());
    }
}

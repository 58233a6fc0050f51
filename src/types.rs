//! Scalar type aliases and small shared value types.
//!
//! Grounded on `include/arion/common/global_defs.hpp` in the original
//! implementation: `ADDR`, `REG`, the `RVAL*` register-value widths, `SEGMENT`,
//! `SIGNAL`, `CPU_ARCH` and `LINKAGE_TYPE`.

use std::collections::HashMap;

/// A guest virtual address.
pub type Addr = u64;
/// An emulator-engine register id (arch-specific numbering, opaque here).
pub type Reg = u64;
/// The maximum register width this crate moves in or out of the engine.
pub type Rval = u64;

pub const ARION_BUF_SZ: usize = 0x1000;
pub const ARION_SYSTEM_PAGE_SZ: u64 = 0x1000;
pub const ARION_PROCESS_PID: u64 = 1;
/// Cycles a thread runs for before the scheduler preempts it.
pub const ARION_CYCLES_PER_THREAD: u64 = 0x1000;

/// One loadable ELF segment, or the stand-in for one in baremetal mode.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub virt_addr: Addr,
    pub file_addr: u64,
    pub align: u64,
    pub virt_sz: u64,
    pub phy_sz: u64,
    pub flags: u32,
}

/// A queued signal: who sent it, and which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal {
    pub source_pid: u64,
    pub signo: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkageType {
    #[default]
    Unknown,
    Dynamic,
    Static,
}

/// Supported guest CPU architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuArch {
    X86,
    X8664,
    Arm,
    Arm64,
    Ppc32,
}

impl CpuArch {
    pub fn name(self) -> &'static str {
        match self {
            CpuArch::X86 => "x86",
            CpuArch::X8664 => "x86-64",
            CpuArch::Arm => "arm",
            CpuArch::Arm64 => "arm64",
            CpuArch::Ppc32 => "ppc32",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "x86" => CpuArch::X86,
            "x86-64" | "x86_64" | "x8664" => CpuArch::X8664,
            "arm" => CpuArch::Arm,
            "arm64" | "aarch64" => CpuArch::Arm64,
            "ppc32" => CpuArch::Ppc32,
            _ => return None,
        })
    }

    /// Native pointer width for this architecture, in bytes.
    pub fn ptr_width(self) -> usize {
        match self {
            CpuArch::X86 | CpuArch::Arm | CpuArch::Ppc32 => 4,
            CpuArch::X8664 | CpuArch::Arm64 => 8,
        }
    }

    pub fn is_64_bit(self) -> bool {
        self.ptr_width() == 8
    }
}

pub fn arch_from_name_map() -> HashMap<&'static str, CpuArch> {
    [
        ("x86", CpuArch::X86),
        ("x86-64", CpuArch::X8664),
        ("arm", CpuArch::Arm),
        ("arm64", CpuArch::Arm64),
        ("ppc32", CpuArch::Ppc32),
    ]
    .into_iter()
    .collect()
}

//! # Shared Hardware Records (Driver ↔ Diagnostics)
//!
//! Defines the plain records that the driver-side collaborators hand to the
//! diagnostics crate: live wave state read back from the shader engines and
//! the buffer list of a command stream. All types use `#[repr(C)]` so they can
//! be filled directly from a kernel query or a mapped register dump.
//!
//! ## Key Types
//!
//! - [`WaveInfo`] - One in-flight wave, as reported by wave introspection
//! - [`BufferListItem`] - One resident buffer referenced by a command stream
//! - [`usage`] - Bit positions of the buffer usage mask and their labels
//!
//! The `serde` feature derives `Serialize`/`Deserialize` for replaying
//! captured device state.

#![no_std]

// ============================================================================
// Limits
// ============================================================================

/// Upper bound on the number of waves a single chip can have in flight
///
/// 4 shader engines × 16 compute units × 4 SIMDs × 10 wave slots.
pub const MAX_WAVES_PER_CHIP: usize = 4 * 16 * 4 * 10;

/// Default GART page size used to express buffer ranges in page units
pub const DEFAULT_GART_PAGE_SIZE: u64 = 4096;

// ============================================================================
// Wave Introspection
// ============================================================================

/// State of one hardware wave at the time of the query
///
/// Waves are delivered sorted by program counter; consumers rely on that
/// ordering to correlate them with disassembly in a single pass.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WaveInfo {
    /// Shader engine index
    pub se: u32,

    /// Shader array index within the engine
    pub sh: u32,

    /// Compute unit index within the array
    pub cu: u32,

    /// SIMD index within the compute unit
    pub simd: u32,

    /// Wave slot within the SIMD
    pub wave: u32,

    /// Raw wave status register
    #[cfg_attr(feature = "serde", serde(default))]
    pub status: u32,

    /// Program counter: device address of the instruction being executed
    pub pc: u64,

    /// Execution mask
    #[cfg_attr(feature = "serde", serde(default))]
    pub exec: u64,

    /// First dword of the instruction being executed
    #[cfg_attr(feature = "serde", serde(default))]
    pub inst_dw0: u32,

    /// Second dword of the instruction being executed (64-bit encodings only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub inst_dw1: u32,
}

// ============================================================================
// Buffer Residency
// ============================================================================

/// A buffer object referenced by a command stream
///
/// `vm_address` and `bo_size` are in bytes and aligned to the GART page size
/// by the allocator. Live ranges of distinct entries never overlap.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferListItem {
    /// Device virtual address of the first byte
    pub vm_address: u64,

    /// Size in bytes
    pub bo_size: u64,

    /// Bitmask of [`usage`] bits the driver attached to this buffer
    #[cfg_attr(feature = "serde", serde(default))]
    pub priority_usage: u64,
}

impl BufferListItem {
    /// Device address one past the last byte of the buffer
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.vm_address.saturating_add(self.bo_size)
    }

    /// Whether the usage mask has the given [`usage`] bit set
    #[must_use]
    pub fn has_usage(&self, bit: u32) -> bool {
        bit < 64 && self.priority_usage & (1u64 << bit) != 0
    }
}

/// Usage bits of [`BufferListItem::priority_usage`]
///
/// The bit position doubles as the allocation priority the driver asked for.
pub mod usage {
    pub const FENCE: u32 = 0;
    pub const TRACE: u32 = 1;
    pub const SO_FILLED_SIZE: u32 = 2;
    pub const QUERY: u32 = 3;
    pub const IB1: u32 = 4;
    pub const IB2: u32 = 5;
    pub const DRAW_INDIRECT: u32 = 6;
    pub const INDEX_BUFFER: u32 = 7;
    pub const CP_DMA: u32 = 8;
    pub const CONST_BUFFER: u32 = 9;
    pub const DESCRIPTORS: u32 = 10;
    pub const BORDER_COLORS: u32 = 11;
    pub const SAMPLER_BUFFER: u32 = 12;
    pub const VERTEX_BUFFER: u32 = 13;
    pub const SHADER_RW_BUFFER: u32 = 14;
    pub const COMPUTE_GLOBAL: u32 = 15;
    pub const SAMPLER_TEXTURE: u32 = 16;
    pub const SHADER_RW_IMAGE: u32 = 17;
    pub const SAMPLER_TEXTURE_MSAA: u32 = 18;
    pub const COLOR_BUFFER: u32 = 19;
    pub const DEPTH_BUFFER: u32 = 20;
    pub const COLOR_BUFFER_MSAA: u32 = 21;
    pub const DEPTH_BUFFER_MSAA: u32 = 22;
    pub const SEPARATE_META: u32 = 23;
    pub const SHADER_BINARY: u32 = 24;
    pub const SHADER_RINGS: u32 = 25;
    pub const SCRATCH_BUFFER: u32 = 26;

    /// Labels indexed by bit position
    pub const NAMES: [&str; 27] = [
        "FENCE",
        "TRACE",
        "SO_FILLED_SIZE",
        "QUERY",
        "IB1",
        "IB2",
        "DRAW_INDIRECT",
        "INDEX_BUFFER",
        "CP_DMA",
        "CONST_BUFFER",
        "DESCRIPTORS",
        "BORDER_COLORS",
        "SAMPLER_BUFFER",
        "VERTEX_BUFFER",
        "SHADER_RW_BUFFER",
        "COMPUTE_GLOBAL",
        "SAMPLER_TEXTURE",
        "SHADER_RW_IMAGE",
        "SAMPLER_TEXTURE_MSAA",
        "COLOR_BUFFER",
        "DEPTH_BUFFER",
        "COLOR_BUFFER_MSAA",
        "DEPTH_BUFFER_MSAA",
        "SEPARATE_META",
        "SHADER_BINARY",
        "SHADER_RINGS",
        "SCRATCH_BUFFER",
    ];

    /// Label of a usage bit, `None` for bits the driver never assigns
    #[must_use]
    pub fn name(bit: u32) -> Option<&'static str> {
        NAMES.get(bit as usize).copied()
    }

    /// Mask with a single usage bit set
    #[must_use]
    pub const fn mask(bit: u32) -> u64 {
        1u64 << bit
    }
}

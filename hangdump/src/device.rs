//! Device-side collaborators
//!
//! The diagnostics never talk to hardware directly. Everything they read from
//! the device comes through the types in this module:
//! - [`GpuBuffer`]: a device allocation that may or may not be CPU-mappable
//! - [`WaveIntrospection`]: the list of in-flight waves
//! - [`RegisterReader`]: memory-mapped status register reads
//! - [`DeviceInfo`]: identity strings and allocator parameters

use hangdump_common::{WaveInfo, DEFAULT_GART_PAGE_SIZE};
use serde::{Deserialize, Serialize};

/// A device allocation referenced by diagnostic records
///
/// `contents` is `None` when the buffer cannot be mapped for reading (evicted,
/// lost with a wedged device, or never CPU-visible). Readers must degrade
/// instead of failing when that happens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuBuffer {
    gpu_address: u64,
    size: u64,
    contents: Option<Vec<u32>>,
}

impl GpuBuffer {
    /// Buffer whose contents can be read back
    #[must_use]
    pub fn mapped(gpu_address: u64, words: Vec<u32>) -> Self {
        let size = (words.len() * 4) as u64;
        Self { gpu_address, size, contents: Some(words) }
    }

    /// Buffer that exists on the device but cannot be mapped
    #[must_use]
    pub fn unmappable(gpu_address: u64, size: u64) -> Self {
        Self { gpu_address, size, contents: None }
    }

    #[must_use]
    pub fn gpu_address(&self) -> u64 {
        self.gpu_address
    }

    /// Size in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Device address one past the last byte
    #[must_use]
    pub fn end_address(&self) -> u64 {
        self.gpu_address.saturating_add(self.size)
    }

    /// Map the buffer for reading
    ///
    /// Does not wait for the device: if the GPU is still writing (or hung),
    /// the returned data may be stale.
    #[must_use]
    pub fn map(&self) -> Option<&[u32]> {
        self.contents.as_deref()
    }
}

/// Identity strings and allocator parameters of the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub driver_vendor: String,
    pub device_vendor: String,
    pub device_name: String,
    /// Graphics IP generation; status registers differ before and after 9
    #[serde(default = "default_gfx_level")]
    pub gfx_level: u32,
    #[serde(default = "default_page_size")]
    pub gart_page_size: u64,
}

fn default_gfx_level() -> u32 {
    9
}

fn default_page_size() -> u64 {
    DEFAULT_GART_PAGE_SIZE
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            driver_vendor: "unknown".to_string(),
            device_vendor: "unknown".to_string(),
            device_name: "unknown".to_string(),
            gfx_level: default_gfx_level(),
            gart_page_size: DEFAULT_GART_PAGE_SIZE,
        }
    }
}

/// Source of live wave state
///
/// Implementations return waves sorted by program counter and an empty list
/// when the device query is unsupported.
pub trait WaveIntrospection {
    fn waves(&self) -> Vec<WaveInfo>;
}

/// Fixed wave list, used when replaying a capture
#[derive(Debug, Clone, Default)]
pub struct RecordedWaves(pub Vec<WaveInfo>);

impl WaveIntrospection for RecordedWaves {
    fn waves(&self) -> Vec<WaveInfo> {
        let mut waves = self.0.clone();
        waves.sort_by_key(|w| w.pc);
        waves
    }
}

/// Memory-mapped register reads
pub trait RegisterReader {
    /// Read one register, `None` if the read is refused
    fn read_register(&self, offset: u32) -> Option<u32>;
}

/// Fixed register values, used when replaying a capture
#[derive(Debug, Clone, Default)]
pub struct RecordedRegisters(pub Vec<(u32, u32)>);

impl RegisterReader for RecordedRegisters {
    fn read_register(&self, offset: u32) -> Option<u32> {
        self.0.iter().find(|(o, _)| *o == offset).map(|(_, v)| *v)
    }
}

/// Status registers worth dumping on a hang, with their MMIO offsets
///
/// The `SRBM_*` registers only exist up to graphics level 8.
pub const STATUS_REGISTERS: &[(&str, u32)] = &[
    ("GRBM_STATUS", 0x008010),
    ("GRBM_STATUS2", 0x008008),
    ("GRBM_STATUS_SE0", 0x008014),
    ("GRBM_STATUS_SE1", 0x008018),
    ("GRBM_STATUS_SE2", 0x008038),
    ("GRBM_STATUS_SE3", 0x00803C),
    ("SDMA0_STATUS_REG", 0x00D034),
    ("SDMA1_STATUS_REG", 0x00D834),
    ("SRBM_STATUS", 0x000E50),
    ("SRBM_STATUS2", 0x000E4C),
    ("SRBM_STATUS3", 0x000E54),
    ("CP_STAT", 0x008680),
    ("CP_STALLED_STAT1", 0x008674),
    ("CP_STALLED_STAT2", 0x008678),
    ("CP_STALLED_STAT3", 0x008670),
    ("CP_CPC_STATUS", 0x008210),
    ("CP_CPC_BUSY_STAT", 0x008214),
    ("CP_CPC_STALLED_STAT1", 0x008218),
    ("CP_CPF_STATUS", 0x00821C),
    ("CP_CPF_BUSY_STAT", 0x008220),
    ("CP_CPF_STALLED_STAT1", 0x008224),
];

/// Status registers applicable to a graphics level
pub fn status_registers(gfx_level: u32) -> impl Iterator<Item = (&'static str, u32)> {
    STATUS_REGISTERS
        .iter()
        .copied()
        .filter(move |(name, _)| gfx_level <= 8 || !name.starts_with("SRBM_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmappable_buffer_degrades() {
        let buffer = GpuBuffer::unmappable(0x1000, 256);
        assert_eq!(buffer.map(), None);
        assert_eq!(buffer.end_address(), 0x1100);
    }

    #[test]
    fn test_mapped_buffer_size_tracks_words() {
        let buffer = GpuBuffer::mapped(0x2000, vec![1, 2, 3]);
        assert_eq!(buffer.size(), 12);
        assert_eq!(buffer.map(), Some(&[1, 2, 3][..]));
    }

    #[test]
    fn test_recorded_waves_come_back_sorted() {
        let waves = RecordedWaves(vec![
            WaveInfo { pc: 0x30, ..WaveInfo::default() },
            WaveInfo { pc: 0x10, ..WaveInfo::default() },
        ]);
        let pcs: Vec<_> = waves.waves().iter().map(|w| w.pc).collect();
        assert_eq!(pcs, [0x10, 0x30]);
    }

    #[test]
    fn test_srbm_registers_only_on_old_chips() {
        assert!(status_registers(8).any(|(name, _)| name == "SRBM_STATUS"));
        assert!(!status_registers(9).any(|(name, _)| name == "SRBM_STATUS"));
        assert!(status_registers(10).any(|(name, _)| name == "CP_STAT"));
    }
}

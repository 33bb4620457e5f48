//! Descriptor tables as the driver authors them

use std::ops::Range;
use std::rc::Rc;

use crate::device::GpuBuffer;

/// A descriptor list: CPU-authored words plus the copy uploaded to the GPU
///
/// Slots are `element_dw_size` dwords wide. Only the slots in
/// `first_active_slot..first_active_slot + num_active_slots` are uploaded, so
/// only those are worth comparing against the GPU copy.
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    /// Words the driver wrote, indexed by (remapped) slot
    pub list: Vec<u32>,
    /// Uploaded copy, if any
    pub gpu_list: Option<Rc<GpuBuffer>>,
    pub element_dw_size: usize,
    pub first_active_slot: usize,
    pub num_active_slots: usize,
}

impl DescriptorTable {
    /// Table whose slots are all active and that has no GPU copy yet
    #[must_use]
    pub fn new(list: Vec<u32>, element_dw_size: usize) -> Self {
        let num_active_slots = list.len() / element_dw_size.max(1);
        Self { list, gpu_list: None, element_dw_size, first_active_slot: 0, num_active_slots }
    }

    #[must_use]
    pub fn with_gpu_list(mut self, gpu_list: Rc<GpuBuffer>) -> Self {
        self.gpu_list = Some(gpu_list);
        self
    }

    #[must_use]
    pub fn with_active_slots(mut self, first: usize, count: usize) -> Self {
        self.first_active_slot = first;
        self.num_active_slots = count;
        self
    }

    /// Dword range covered by the active slots
    ///
    /// A range that does not fit in `usize` saturates, so it holds no slot of
    /// any real list.
    #[must_use]
    pub fn active_dw_range(&self) -> Range<usize> {
        let begin = self.first_active_slot.saturating_mul(self.element_dw_size);
        let len = self.num_active_slots.saturating_mul(self.element_dw_size);
        begin..begin.saturating_add(len)
    }
}

//! Descriptor list auditing
//!
//! At capture time the CPU-authored words of the audited slots are copied
//! into the record; the GPU copy is only referenced. At print time each slot
//! is shown from the GPU copy (falling back to the CPU words when the upload
//! cannot be mapped) and compared word for word with what the driver wrote.

use log::debug;
use std::io::{self, Write};
use std::ops::Range;
use std::rc::Rc;

use super::layout::{word_groups, SlotRemap};
use super::table::DescriptorTable;
use crate::chunk_log::LogChunk;
use crate::device::GpuBuffer;
use crate::domain::CaptureError;
use crate::report::{Sink, Tone};

/// Line printed under a slot whose GPU words differ from the CPU words
pub const CORRUPTION_LINE: &str = "!!!!! This slot was corrupted in GPU memory !!!!!";

/// Audited slots of one descriptor list
pub struct DescriptorListChunk {
    shader_label: String,
    element_name: String,
    element_dw_size: usize,
    slot_remap: SlotRemap,
    /// CPU words of the retained slots, densely packed by slot
    cpu_words: Vec<u32>,
    gpu_list: Option<Rc<GpuBuffer>>,
}

/// Snapshot the slots of `table` worth auditing
///
/// `requested_count` is an upper bound from the caller; it is reduced while
/// the last requested slot, after remapping, lies outside the table's active
/// range. Returns `Ok(None)` when the table has no CPU list or no slot
/// survives the clamp.
///
/// # Errors
/// Returns [`CaptureError::DescriptorListOutOfMemory`] if the CPU words cannot
/// be copied
pub fn audit(
    table: &DescriptorTable,
    shader_label: &str,
    element_name: &str,
    element_dw_size: usize,
    requested_count: usize,
    slot_remap: SlotRemap,
) -> Result<Option<DescriptorListChunk>, CaptureError> {
    if table.list.is_empty() || element_dw_size == 0 {
        return Ok(None);
    }

    let active = table.active_dw_range();
    // No more slots can be retained than the list holds
    let mut count = requested_count.min(table.list.len() / element_dw_size);
    while count > 0 {
        let retained = slot_words(slot_remap, count - 1, element_dw_size).is_some_and(|words| {
            words.start >= active.start && words.end <= active.end && words.end <= table.list.len()
        });
        if retained {
            break;
        }
        count -= 1;
    }
    if count < requested_count {
        debug!("{shader_label}{element_name}: clamped {requested_count} slots to {count}");
    }
    if count == 0 {
        return Ok(None);
    }

    let total = count * element_dw_size;
    let mut cpu_words = Vec::new();
    cpu_words.try_reserve_exact(total).map_err(|_| CaptureError::DescriptorListOutOfMemory {
        list: format!("{shader_label}{element_name}"),
        words: total,
    })?;
    for slot in 0..count {
        // Slots outside the CPU list read as zero
        match slot_words(slot_remap, slot, element_dw_size).and_then(|r| table.list.get(r)) {
            Some(words) => cpu_words.extend_from_slice(words),
            None => cpu_words.extend(std::iter::repeat(0).take(element_dw_size)),
        }
    }

    Ok(Some(DescriptorListChunk {
        shader_label: shader_label.to_string(),
        element_name: element_name.to_string(),
        element_dw_size,
        slot_remap,
        cpu_words,
        gpu_list: table.gpu_list.clone(),
    }))
}

/// Dword range of a slot after remapping, `None` if it overflows
fn slot_words(slot_remap: SlotRemap, slot: usize, element_dw_size: usize) -> Option<Range<usize>> {
    let slot = u32::try_from(slot).ok()?;
    let begin = usize::try_from(slot_remap(slot)).ok()?.checked_mul(element_dw_size)?;
    Some(begin..begin.checked_add(element_dw_size)?)
}

impl DescriptorListChunk {
    /// Number of audited slots
    #[must_use]
    pub fn num_slots(&self) -> usize {
        self.cpu_words.len() / self.element_dw_size
    }

    /// Heading prefix, e.g. `VS - Constant buffer`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}{}", self.shader_label, self.element_name)
    }

    fn cpu_slot(&self, slot: usize) -> &[u32] {
        let begin = slot * self.element_dw_size;
        &self.cpu_words[begin..begin + self.element_dw_size]
    }

    /// Words of a slot in the GPU copy, `None` if unmappable or out of range
    fn gpu_slot(&self, slot: usize) -> Option<&[u32]> {
        let mapped = self.gpu_list.as_deref()?.map()?;
        mapped.get(slot_words(self.slot_remap, slot, self.element_dw_size)?)
    }

    /// Slots whose GPU words differ from the CPU words
    #[must_use]
    pub fn corrupted_slots(&self) -> Vec<usize> {
        (0..self.num_slots())
            .filter(|&slot| self.gpu_slot(slot).is_some_and(|gpu| gpu != self.cpu_slot(slot)))
            .collect()
    }
}

impl LogChunk for DescriptorListChunk {
    fn render(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        let label = self.label();

        for slot in 0..self.num_slots() {
            let cpu = self.cpu_slot(slot);
            let gpu = self.gpu_slot(slot);
            let (words, note) = match gpu {
                Some(words) => (words, "GPU list"),
                None => (cpu, "CPU list"),
            };

            sink.painted_line(Tone::Good, format!("{label} slot {slot} ({note}):"))?;

            let groups = word_groups(self.element_dw_size);
            if groups.is_empty() {
                for (j, word) in words.iter().enumerate() {
                    writeln!(sink, "        DWORD{j} <- 0x{word:08x}")?;
                }
            }
            for group in groups {
                if let Some(heading) = group.heading {
                    sink.painted_line(Tone::Accent, format!("    {heading}"))?;
                }
                for (j, word) in words.iter().skip(group.first).take(group.count).enumerate() {
                    writeln!(sink, "        {}{j} <- 0x{word:08x}", group.register)?;
                }
            }

            if gpu.is_some_and(|gpu| gpu != cpu) {
                sink.painted_line(Tone::Alert, CORRUPTION_LINE)?;
            }
            writeln!(sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptors::layout::{identity, shaderbuf_slot};

    fn gpu_copy(words: Vec<u32>) -> Rc<GpuBuffer> {
        Rc::new(GpuBuffer::mapped(0x8000, words))
    }

    fn render(chunk: &DescriptorListChunk) -> String {
        let mut out = Vec::new();
        chunk.render(&mut Sink::plain(&mut out)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_identical_copies_report_no_corruption() {
        let words: Vec<u32> = (0..16).collect();
        let table = DescriptorTable::new(words.clone(), 4).with_gpu_list(gpu_copy(words));

        let chunk = audit(&table, "", "RW buffers", 4, 4, identity).unwrap().unwrap();
        assert!(chunk.corrupted_slots().is_empty());
        assert!(!render(&chunk).contains(CORRUPTION_LINE));
    }

    #[test]
    fn test_flipped_word_flags_only_its_slot() {
        let words: Vec<u32> = (0..16).collect();
        let mut uploaded = words.clone();
        uploaded[9] ^= 0x100;
        let table = DescriptorTable::new(words, 4).with_gpu_list(gpu_copy(uploaded));

        let chunk = audit(&table, "PS", " - Constant buffer", 4, 4, identity).unwrap().unwrap();
        assert_eq!(chunk.corrupted_slots(), [2]);

        let text = render(&chunk);
        assert_eq!(text.matches(CORRUPTION_LINE).count(), 1);
        let slot2 = text.find("PS - Constant buffer slot 2 (GPU list):").unwrap();
        let slot3 = text.find("PS - Constant buffer slot 3").unwrap();
        let alert = text.find(CORRUPTION_LINE).unwrap();
        assert!(slot2 < alert && alert < slot3);
    }

    #[test]
    fn test_unmappable_gpu_copy_falls_back_to_cpu_list() {
        let table = DescriptorTable::new(vec![7; 8], 4)
            .with_gpu_list(Rc::new(GpuBuffer::unmappable(0x8000, 32)));

        let chunk = audit(&table, "VS", " - Shader buffer", 4, 2, identity).unwrap().unwrap();
        let text = render(&chunk);
        assert!(text.contains("VS - Shader buffer slot 0 (CPU list):"));
        assert!(chunk.corrupted_slots().is_empty());
    }

    #[test]
    fn test_requested_count_clamped_to_active_range() {
        let table = DescriptorTable::new(vec![0; 64], 4).with_active_slots(0, 3);
        let chunk = audit(&table, "", "RW buffers", 4, 10, identity).unwrap().unwrap();
        assert_eq!(chunk.num_slots(), 3);
    }

    #[test]
    fn test_reversed_remap_clamps_past_first_slot() {
        // Shader buffers are stored in reverse from slot 15 down
        let table = DescriptorTable::new(vec![0; 32 * 4], 4);
        let chunk =
            audit(&table, "CS", " - Shader buffer", 4, 20, shaderbuf_slot).unwrap().unwrap();
        assert_eq!(chunk.num_slots(), 16);
    }

    #[test]
    fn test_huge_requested_count_is_bounded_by_list() {
        let table = DescriptorTable::new(vec![0; 16], 4).with_active_slots(0, usize::MAX);
        let chunk = audit(&table, "", "RW buffers", 4, usize::MAX, identity).unwrap().unwrap();
        assert_eq!(chunk.num_slots(), 4);
    }

    #[test]
    fn test_active_range_past_list_yields_nothing() {
        let table = DescriptorTable::new(vec![1, 2, 3, 4], 4).with_active_slots(usize::MAX, 1);
        assert!(audit(&table, "", "RW buffers", 4, 1, identity).unwrap().is_none());
    }

    #[test]
    fn test_empty_list_yields_nothing() {
        let table = DescriptorTable::default();
        assert!(audit(&table, "", "RW buffers", 4, 4, identity).unwrap().is_none());
    }

    #[test]
    fn test_sampler_slot_layout() {
        let table = DescriptorTable::new(vec![1; 16], 16);
        let chunk = audit(&table, "PS", " - Sampler", 16, 1, identity).unwrap().unwrap();
        let text = render(&chunk);

        assert!(text.contains("        SQ_IMG_RSRC_WORD7 <- 0x00000001"));
        assert!(text.contains("    Buffer:\n        SQ_BUF_RSRC_WORD0"));
        assert!(text.contains("    FMASK:\n"));
        assert!(text.contains("    Sampler state:\n        SQ_IMG_SAMP_WORD0"));
        assert!(text.contains("SQ_IMG_SAMP_WORD3"));
    }
}

//! Segmented command streams
//!
//! The encoder writes commands into a chain of fixed-size segments. Once a
//! segment fills up it is retired to the history list and never written
//! again; only the live (current) segment grows.

use hangdump_common::BufferListItem;
use std::cell::RefCell;
use std::rc::Rc;

/// Read access to an append-only, segmented command stream
pub trait SegmentedStream {
    /// Number of retired segments
    fn num_previous(&self) -> usize;

    /// Committed words of a retired segment, oldest first
    fn previous(&self, index: usize) -> &[u32];

    /// Committed words of the live segment
    fn current(&self) -> &[u32];

    /// Buffers referenced by the stream so far
    fn buffer_list(&self) -> Vec<BufferListItem>;

    /// Committed words across every segment
    fn total_dw(&self) -> usize {
        (0..self.num_previous()).map(|i| self.previous(i).len()).sum::<usize>()
            + self.current().len()
    }
}

/// Stream shared between its owner and pending diagnostic records
pub type SharedStream = Rc<RefCell<dyn SegmentedStream>>;

/// Iterate over all segments in submission order, the live one last
pub fn segments(stream: &dyn SegmentedStream) -> impl Iterator<Item = &[u32]> + '_ {
    (0..stream.num_previous()).map(move |i| stream.previous(i)).chain(Some(stream.current()))
}

/// In-memory segmented command buffer
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    previous: Vec<Vec<u32>>,
    current: Vec<u32>,
    max_segment_dw: usize,
    buffers: Vec<BufferListItem>,
}

impl CommandBuffer {
    /// Default number of dwords per segment
    pub const DEFAULT_SEGMENT_DW: usize = 16 * 1024;

    #[must_use]
    pub fn new(max_segment_dw: usize) -> Self {
        Self {
            previous: Vec::new(),
            current: Vec::new(),
            max_segment_dw: max_segment_dw.max(1),
            buffers: Vec::new(),
        }
    }

    /// Rebuild a buffer from recorded segments; the last one becomes live
    #[must_use]
    pub fn from_segments(mut segments: Vec<Vec<u32>>) -> Self {
        let current = segments.pop().unwrap_or_default();
        let max_segment_dw = segments
            .iter()
            .chain(Some(&current))
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(Self::DEFAULT_SEGMENT_DW);
        Self { previous: segments, current, max_segment_dw, buffers: Vec::new() }
    }

    /// Wrap into the shared handle diagnostic records keep alive
    #[must_use]
    pub fn into_shared(self) -> Rc<RefCell<CommandBuffer>> {
        Rc::new(RefCell::new(self))
    }

    /// Append one dword, retiring the live segment first when it is full
    pub fn emit(&mut self, word: u32) {
        if self.current.len() >= self.max_segment_dw {
            self.start_new_segment();
        }
        self.current.push(word);
    }

    pub fn emit_all(&mut self, words: &[u32]) {
        for &word in words {
            self.emit(word);
        }
    }

    /// Retire the live segment even if it still has room
    pub fn start_new_segment(&mut self) {
        let retired = std::mem::take(&mut self.current);
        self.previous.push(retired);
    }

    /// Reference a buffer; repeated references merge their usage bits
    pub fn add_buffer(&mut self, item: BufferListItem) {
        if let Some(existing) = self.buffers.iter_mut().find(|b| b.vm_address == item.vm_address) {
            existing.priority_usage |= item.priority_usage;
            existing.bo_size = existing.bo_size.max(item.bo_size);
        } else {
            self.buffers.push(item);
        }
    }

    /// Drop everything; called by the owner once the stream was submitted
    pub fn reset(&mut self) {
        self.previous.clear();
        self.current.clear();
        self.buffers.clear();
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SEGMENT_DW)
    }
}

impl SegmentedStream for CommandBuffer {
    fn num_previous(&self) -> usize {
        self.previous.len()
    }

    fn previous(&self, index: usize) -> &[u32] {
        &self.previous[index]
    }

    fn current(&self) -> &[u32] {
        &self.current
    }

    fn buffer_list(&self) -> Vec<BufferListItem> {
        self.buffers.clone()
    }
}

//! Buffer residency analysis
//!
//! Turns the buffer list of a command stream into an address-ordered table of
//! the device virtual memory the IB touches, with the unused ranges between
//! buffers shown as holes.
//!
//! # Output
//!
//! The header names the page size in use; for 4 KiB pages:
//!
//! ```text
//! Buffer list (in units of pages = 4kB):
//!         Size    VM start page         VM end page           Usage
//!           20    0x0000000000032       0x0000000000046       FENCE
//!           30    -- hole --
//!           10    0x0000000000064       0x000000000006E       IB1, DESCRIPTORS
//!
//! Note: The holes represent memory not used by the IB.
//!       Other buffers can still be allocated there.
//! ```
//!
//! # Performance
//!
//! - `analyze()`: O(n log n), the sort dominates
//! - The caller's list is never reordered; a local copy is sorted

use std::borrow::Cow;
use std::io::{self, Write};

use hangdump_common::{usage, BufferListItem, DEFAULT_GART_PAGE_SIZE};

use crate::report::{Sink, Tone};

// =============================================================================
// REPORT ROWS
// =============================================================================

/// One line of the residency table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResidencyRow {
    /// Unused virtual memory between two buffers
    Hole { pages: u64 },

    /// A referenced buffer
    Buffer {
        size_pages: u64,
        start_page: u64,
        end_page: u64,
        /// Usage labels in bit order
        usage: Vec<Cow<'static, str>>,
    },
}

/// Address-ordered residency table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidencyReport {
    pub page_size: u64,
    pub rows: Vec<ResidencyRow>,
}

impl ResidencyReport {
    /// Sizes of the holes, in pages, lowest address first
    pub fn holes(&self) -> impl Iterator<Item = u64> + '_ {
        self.rows.iter().filter_map(|row| match row {
            ResidencyRow::Hole { pages } => Some(*pages),
            ResidencyRow::Buffer { .. } => None,
        })
    }

    /// Number of buffer rows
    #[must_use]
    pub fn buffers(&self) -> usize {
        self.rows.iter().filter(|row| matches!(row, ResidencyRow::Buffer { .. })).count()
    }

    /// Write the table
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn render(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        writeln!(sink, "Buffer list (in units of pages = {}):", page_size_label(self.page_size))?;
        sink.painted_line(
            Tone::Heading,
            "        Size    VM start page         VM end page           Usage",
        )?;

        for row in &self.rows {
            match row {
                ResidencyRow::Hole { pages } => writeln!(sink, "  {pages:>10}    -- hole --")?,
                ResidencyRow::Buffer { size_pages, start_page, end_page, usage } => writeln!(
                    sink,
                    "  {size_pages:>10}    0x{start_page:013X}       0x{end_page:013X}       {}",
                    usage.join(", ")
                )?,
            }
        }

        write!(
            sink,
            "\nNote: The holes represent memory not used by the IB.\n      \
             Other buffers can still be allocated there.\n\n"
        )
    }
}

// =============================================================================
// ANALYSIS
// =============================================================================

/// Build the residency table of a buffer list
///
/// Entries are sorted by address on a local copy. A hole row precedes every
/// buffer that starts after the end of the previous one. A `page_size` of 0
/// falls back to 4096 bytes.
#[must_use]
pub fn analyze(entries: &[BufferListItem], page_size: u64) -> ResidencyReport {
    let page_size = if page_size == 0 { DEFAULT_GART_PAGE_SIZE } else { page_size };

    let mut sorted = entries.to_vec();
    sorted.sort_by_key(|item| item.vm_address);

    let mut rows = Vec::with_capacity(sorted.len() * 2);
    let mut previous_end = None;

    for item in &sorted {
        if let Some(end) = previous_end {
            if item.vm_address > end {
                rows.push(ResidencyRow::Hole { pages: (item.vm_address - end) / page_size });
            }
        }

        rows.push(ResidencyRow::Buffer {
            size_pages: item.bo_size / page_size,
            start_page: item.vm_address / page_size,
            end_page: item.end_address() / page_size,
            usage: usage_labels(item.priority_usage),
        });
        previous_end = Some(item.end_address());
    }

    ResidencyReport { page_size, rows }
}

/// Decode a usage mask into labels, lowest bit first
#[must_use]
pub fn usage_labels(mask: u64) -> Vec<Cow<'static, str>> {
    (0..64u32)
        .filter(|bit| mask & usage::mask(*bit) != 0)
        .map(|bit| match usage::name(bit) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(format!("UNKNOWN_{bit}")),
        })
        .collect()
}

/// Page size as printed in the table header, e.g. `4kB`
fn page_size_label(page_size: u64) -> String {
    if page_size >= 1024 && page_size % 1024 == 0 {
        format!("{}kB", page_size / 1024)
    } else {
        format!("{page_size}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: u64 = 4096;

    fn item(start_page: u64, pages: u64, priority_usage: u64) -> BufferListItem {
        BufferListItem { vm_address: start_page * PAGE, bo_size: pages * PAGE, priority_usage }
    }

    #[test]
    fn test_gap_between_buffers_is_a_hole() {
        // Deliberately unsorted
        let entries = [item(100, 10, 0), item(50, 20, 0)];
        let report = analyze(&entries, PAGE);

        assert_eq!(report.holes().collect::<Vec<_>>(), [30]);
        assert_eq!(report.buffers(), 2);
        assert!(matches!(report.rows[0], ResidencyRow::Buffer { start_page: 50, .. }));
        assert!(matches!(
            report.rows[2],
            ResidencyRow::Buffer { start_page: 100, end_page: 110, .. }
        ));
    }

    #[test]
    fn test_contiguous_buffers_have_no_hole() {
        let entries = [item(50, 20, 0), item(70, 10, 0)];
        let report = analyze(&entries, PAGE);
        assert_eq!(report.holes().count(), 0);
    }

    #[test]
    fn test_input_order_is_preserved() {
        let entries = vec![item(100, 10, 0), item(50, 20, 0)];
        let before = entries.clone();
        let _ = analyze(&entries, PAGE);
        assert_eq!(entries, before);
    }

    #[test]
    fn test_zero_page_size_falls_back() {
        let report = analyze(&[item(2, 1, 0)], 0);
        assert_eq!(report.page_size, 4096);
        assert!(matches!(
            report.rows[0],
            ResidencyRow::Buffer { size_pages: 1, start_page: 2, .. }
        ));
    }

    #[test]
    fn test_usage_labels_in_bit_order() {
        let mask = usage::mask(usage::DESCRIPTORS) | usage::mask(usage::FENCE) | usage::mask(40);
        assert_eq!(usage_labels(mask), ["FENCE", "DESCRIPTORS", "UNKNOWN_40"]);
    }

    #[test]
    fn test_render_layout() {
        let entries = [item(0x32, 20, usage::mask(usage::FENCE)), item(0x64, 10, 0)];
        let mut out = Vec::new();
        analyze(&entries, PAGE).render(&mut Sink::plain(&mut out)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Buffer list (in units of pages = 4kB):\n"));
        let row = "          20    0x0000000000032       0x0000000000046       FENCE\n";
        assert!(text.contains(row));
        assert!(text.contains("          30    -- hole --\n"));
        assert!(text.contains("Note: The holes represent memory not used by the IB."));
    }

    #[test]
    fn test_header_names_actual_page_size() {
        let mut out = Vec::new();
        analyze(&[item(0, 64, 0)], 65536).render(&mut Sink::plain(&mut out)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Buffer list (in units of pages = 64kB):\n"));

        assert_eq!(page_size_label(4096), "4kB");
        assert_eq!(page_size_label(512), "512B");
    }
}

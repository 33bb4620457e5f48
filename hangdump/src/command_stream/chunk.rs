//! Command-stream log records
//!
//! A [`CommandStreamChunk`] only stores dword ranges at capture time. The
//! words themselves are read when the log is printed: from the saved copy if
//! the IB was flushed to the hardware by then, otherwise straight out of the
//! live stream's segments.

use log::warn;
use std::io::{self, Write};
use std::ops::Range;
use std::rc::Rc;

use super::snapshot::{CommandStreamSnapshot, SavedCommandStream, TrackedStreams};
use super::stream::{segments, SharedStream};
use crate::chunk_log::LogChunk;
use crate::device::GpuBuffer;
use crate::domain::StreamKind;
use crate::report::Sink;
use crate::residency;

/// Dword ranges of the tracked streams, rendered lazily
pub struct CommandStreamChunk {
    saved: Rc<SavedCommandStream>,
    streams: TrackedStreams,
    gfx: Range<usize>,
    compute: Range<usize>,
    dump_buffer_list: bool,
    page_size: u64,
}

impl CommandStreamChunk {
    pub(crate) fn new(
        saved: Rc<SavedCommandStream>,
        streams: TrackedStreams,
        gfx: Range<usize>,
        compute: Range<usize>,
        dump_buffer_list: bool,
        page_size: u64,
    ) -> Self {
        Self { saved, streams, gfx, compute, dump_buffer_list, page_size }
    }

    #[must_use]
    pub fn gfx_range(&self) -> Range<usize> {
        self.gfx.clone()
    }

    #[must_use]
    pub fn compute_range(&self) -> Range<usize> {
        self.compute.clone()
    }

    #[must_use]
    pub fn dumps_buffer_list(&self) -> bool {
        self.dump_buffer_list
    }

    fn render_ib(
        &self,
        sink: &mut Sink<'_>,
        kind: StreamKind,
        range: &Range<usize>,
        trace_id: Option<u32>,
    ) -> io::Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let name = kind.ib_name();
        sink.begin_marker(name, range.start)?;
        if let Some(id) = trace_id {
            writeln!(sink, "Last trace ID: {id}")?;
        }

        let snapshot = match kind {
            StreamKind::Gfx => self.saved.gfx_snapshot(),
            StreamKind::Compute => self.saved.compute_snapshot(),
        };
        if let Some(snapshot) = snapshot {
            let end = range.end.min(snapshot.words.len());
            let start = range.start.min(end);
            write_words(sink, &snapshot.words[start..end], start)?;
            if end < range.end {
                warn!("Saved {name} holds {} of {} dwords", snapshot.words.len(), range.end);
                writeln!(
                    sink,
                    "(snapshot truncated: {} of {} dwords)",
                    end - start,
                    range.end - range.start
                )?;
            }
        } else {
            let live = match kind {
                StreamKind::Gfx => Some(&self.streams.gfx),
                StreamKind::Compute => self.streams.compute.as_ref(),
            };
            match live {
                Some(stream) => write_live_segments(sink, stream, name, range)?,
                None => writeln!(sink, "({name} not tracked, contents unavailable)")?,
            }
        }

        sink.end_marker(name, range.end)
    }

    fn render_buffer_list(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        match self.saved.flush_time() {
            Some(time) => {
                write!(sink, "Flushing. Time: {}.{:09}\n\n", time.as_secs(), time.subsec_nanos())?;
            }
            None => writeln!(sink, "Not flushed yet.\n")?,
        }

        let list = if let Some(snapshot) = self.saved.gfx_snapshot() {
            snapshot.buffer_list.clone()
        } else if let Ok(stream) = self.streams.gfx.try_borrow() {
            stream.buffer_list()
        } else {
            warn!("Command stream busy, buffer list unavailable");
            return writeln!(sink, "(buffer list unavailable)\n");
        };

        residency::analyze(&list, self.page_size).render(sink)
    }
}

impl LogChunk for CommandStreamChunk {
    fn render(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        // The GPU may be hung, read the trace ids without waiting.
        let trace_ids = self.saved.trace_buffer().and_then(GpuBuffer::map);
        let gfx_trace = trace_ids.and_then(|ids| ids.first().copied());
        let compute_trace = trace_ids.and_then(|ids| ids.get(1).copied());

        self.render_ib(sink, StreamKind::Gfx, &self.gfx, gfx_trace)?;
        self.render_ib(sink, StreamKind::Compute, &self.compute, compute_trace)?;

        if self.dump_buffer_list {
            self.render_buffer_list(sink)?;
        }
        Ok(())
    }
}

fn write_words(sink: &mut Sink<'_>, words: &[u32], first_dw: usize) -> io::Result<()> {
    for (i, word) in words.iter().enumerate() {
        writeln!(sink, "{:>8}: {word:08x}", first_dw + i)?;
    }
    Ok(())
}

/// Walk the live segments overlapping `range`, separating segments
fn write_live_segments(
    sink: &mut Sink<'_>,
    stream: &SharedStream,
    name: &str,
    range: &Range<usize>,
) -> io::Result<()> {
    let Ok(stream) = stream.try_borrow() else {
        warn!("{name} is being encoded, skipping its contents");
        return writeln!(sink, "(stream busy, contents unavailable)");
    };

    let mut segment_start = 0;
    let mut printed = false;
    for segment in segments(&*stream) {
        let segment_end = segment_start + segment.len();
        let lo = range.start.max(segment_start);
        let hi = range.end.min(segment_end);

        if lo < hi {
            if printed {
                write!(sink, "\n---------- Next {name} Chunk ----------\n\n")?;
            }
            write_words(sink, &segment[lo - segment_start..hi - segment_start], lo)?;
            printed = true;
        }
        segment_start = segment_end;
    }
    Ok(())
}

/// Write a saved sDMA IB: buffer list, then the raw words
///
/// # Errors
/// Returns an error if the sink fails
pub fn dump_dma(
    snapshot: &CommandStreamSnapshot,
    page_size: u64,
    sink: &mut Sink<'_>,
) -> io::Result<()> {
    const IB_NAME: &str = "sDMA IB";

    if !snapshot.buffer_list.is_empty() {
        residency::analyze(&snapshot.buffer_list, page_size).render(sink)?;
    }

    writeln!(sink, "------------------ {IB_NAME} begin ------------------")?;
    for word in &snapshot.words {
        writeln!(sink, " {word:08x}")?;
    }
    writeln!(sink, "------------------- {IB_NAME} end -------------------")?;
    writeln!(sink)?;
    writeln!(sink, "SDMA Dump Done.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_stream::snapshot::{capture_delta, capture_full};
    use crate::command_stream::stream::CommandBuffer;
    use crate::report::parse_marker;
    use hangdump_common::BufferListItem;
    use std::cell::RefCell;

    fn tracked(gfx: &Rc<RefCell<CommandBuffer>>) -> TrackedStreams {
        let shared: SharedStream = gfx.clone();
        TrackedStreams::new(shared, None)
    }

    fn render(chunk: &CommandStreamChunk) -> String {
        let mut out = Vec::new();
        chunk.render(&mut Sink::plain(&mut out)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_live_stream_prints_segment_separators() {
        let gfx = CommandBuffer::new(2).into_shared();
        gfx.borrow_mut().emit_all(&[0xa, 0xb, 0xc]);
        let saved = Rc::new(SavedCommandStream::new(None));

        let chunk = capture_delta(&saved, &tracked(&gfx), false, 4096).unwrap();
        let text = render(&chunk);

        assert!(text.contains("------------------ IB begin (dw = 0) ------------------"));
        assert!(text.contains("---------- Next IB Chunk ----------"));
        assert!(text.contains("       2: 0000000c"));
        assert!(text.contains("------------------- IB end (dw = 3) -------------------"));
        assert!(!text.contains("Buffer list"));
    }

    #[test]
    fn test_flushed_stream_reads_saved_copy() {
        let gfx = CommandBuffer::new(2).into_shared();
        gfx.borrow_mut().emit_all(&[1, 2, 3, 4]);
        let saved = Rc::new(SavedCommandStream::new(None));
        let chunk = capture_delta(&saved, &tracked(&gfx), false, 4096).unwrap();

        saved.finish(&*gfx.borrow(), None);
        gfx.borrow_mut().reset();

        let text = render(&chunk);
        assert!(text.contains("       3: 00000004"));
        assert!(!text.contains("Next IB Chunk"));
    }

    #[test]
    fn test_short_saved_copy_is_marked_truncated() {
        let gfx = CommandBuffer::default().into_shared();
        gfx.borrow_mut().emit_all(&[1, 2, 3, 4]);
        let saved = Rc::new(SavedCommandStream::new(None));
        let chunk = capture_delta(&saved, &tracked(&gfx), false, 4096).unwrap();

        gfx.borrow_mut().reset();
        gfx.borrow_mut().emit_all(&[5, 6]);
        saved.finish(&*gfx.borrow(), None);

        let text = render(&chunk);
        assert!(text.contains("       1: 00000006"));
        assert!(text.contains("(snapshot truncated: 2 of 4 dwords)"));
        assert!(text.contains("IB end (dw = 4)"));
    }

    #[test]
    fn test_markers_carry_delta_offsets() {
        let gfx = CommandBuffer::default().into_shared();
        let streams = tracked(&gfx);
        let saved = Rc::new(SavedCommandStream::new(None));

        gfx.borrow_mut().emit_all(&[1, 2]);
        capture_delta(&saved, &streams, false, 4096).unwrap();
        gfx.borrow_mut().emit_all(&[3, 4, 5]);
        let chunk = capture_delta(&saved, &streams, false, 4096).unwrap();

        let text = render(&chunk);
        let markers: Vec<_> = text.lines().filter_map(parse_marker).collect();
        assert_eq!(markers.len(), 2);
        assert_eq!((markers[0].dw, markers[1].dw), (2, 5));
        assert!(!text.contains("00000001"));
    }

    #[test]
    fn test_busy_stream_renders_unavailable_marker() {
        let gfx = CommandBuffer::default().into_shared();
        gfx.borrow_mut().emit(7);
        let saved = Rc::new(SavedCommandStream::new(None));
        let chunk = capture_delta(&saved, &tracked(&gfx), false, 4096).unwrap();

        let _encoder = gfx.borrow_mut();
        let text = render(&chunk);
        assert!(text.contains("(stream busy, contents unavailable)"));
        assert!(text.contains("IB end (dw = 1)"));
    }

    #[test]
    fn test_full_capture_prints_buffer_list_and_trace_id() {
        let gfx = CommandBuffer::default().into_shared();
        gfx.borrow_mut().emit(1);
        gfx.borrow_mut().add_buffer(BufferListItem {
            vm_address: 0x10000,
            bo_size: 0x2000,
            priority_usage: 1,
        });
        let trace = Rc::new(GpuBuffer::mapped(0x9000, vec![42, 7]));
        let saved = Rc::new(SavedCommandStream::new(Some(trace)));

        let chunk = capture_full(&saved, &tracked(&gfx), 4096).unwrap();
        let text = render(&chunk);

        assert!(text.contains("Last trace ID: 42"));
        assert!(text.contains("Not flushed yet."));
        assert!(text.contains("Buffer list (in units of pages = 4kB):"));
    }

    #[test]
    fn test_dump_dma_frames_raw_words() {
        let snapshot = CommandStreamSnapshot { words: vec![0xdead_beef], buffer_list: Vec::new() };
        let mut out = Vec::new();
        dump_dma(&snapshot, 4096, &mut Sink::plain(&mut out)).unwrap();
        let text = String::from_utf8(out).unwrap();

        let head = "------------------ sDMA IB begin ------------------\n deadbeef\n";
        assert!(text.starts_with(head));
        assert!(text.ends_with("SDMA Dump Done.\n"));
    }
}

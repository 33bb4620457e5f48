//! Linearized snapshots and delta capture
//!
//! A [`SavedCommandStream`] is the per-IB diagnostic handle a driver context
//! owns. It remembers how much of each tracked stream has already been logged
//! (the [`DeltaCursor`]) and, once the IB is flushed to the hardware, holds a
//! linearized copy of the submitted words and buffer list.

use log::{debug, error, warn};
use std::cell::{Cell, Ref, RefCell};
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hangdump_common::BufferListItem;

use super::chunk::CommandStreamChunk;
use super::stream::{segments, SegmentedStream, SharedStream};
use crate::device::GpuBuffer;
use crate::domain::CaptureError;

/// Linear copy of a command stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandStreamSnapshot {
    pub words: Vec<u32>,
    pub buffer_list: Vec<BufferListItem>,
}

/// Linearize every segment of `stream`, oldest first, live segment last
///
/// With `include_residency` the buffer list is copied too; a stream without
/// buffers yields an empty list.
///
/// # Errors
/// Returns [`CaptureError`] if the linear copy cannot be allocated. Nothing
/// else is touched in that case.
pub fn capture(
    stream: &dyn SegmentedStream,
    include_residency: bool,
) -> Result<CommandStreamSnapshot, CaptureError> {
    let total = stream.total_dw();

    let mut words = Vec::new();
    words.try_reserve_exact(total).map_err(|_| CaptureError::OutOfMemory { words: total })?;
    for segment in segments(stream) {
        words.extend_from_slice(segment);
    }

    let buffer_list = if include_residency {
        let live = stream.buffer_list();
        let mut list = Vec::new();
        list.try_reserve_exact(live.len())
            .map_err(|_| CaptureError::BufferListOutOfMemory { count: live.len() })?;
        list.extend_from_slice(&live);
        list
    } else {
        Vec::new()
    };

    Ok(CommandStreamSnapshot { words, buffer_list })
}

/// Watermarks of what has already been logged, per tracked stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaCursor {
    pub gfx_last_dw: usize,
    pub compute_last_dw: usize,
}

/// The streams a driver context tracks
#[derive(Clone)]
pub struct TrackedStreams {
    pub gfx: SharedStream,
    pub compute: Option<SharedStream>,
}

impl TrackedStreams {
    #[must_use]
    pub fn new(gfx: SharedStream, compute: Option<SharedStream>) -> Self {
        Self { gfx, compute }
    }

    /// Current write positions, `None` while a stream is being encoded into
    fn current_dw(&self) -> Option<(usize, usize)> {
        let gfx = self.gfx.try_borrow().ok()?.total_dw();
        let compute = match &self.compute {
            Some(stream) => stream.try_borrow().ok()?.total_dw(),
            None => 0,
        };
        Some((gfx, compute))
    }
}

/// Diagnostic state of one IB: delta watermarks and, once flushed, the copy
#[derive(Debug, Default)]
pub struct SavedCommandStream {
    gfx: RefCell<Option<CommandStreamSnapshot>>,
    compute: RefCell<Option<CommandStreamSnapshot>>,
    cursor: Cell<DeltaCursor>,
    trace_buffer: Option<Rc<GpuBuffer>>,
    flush_time: Cell<Option<Duration>>,
}

impl SavedCommandStream {
    /// Fresh handle; `trace_buffer` holds the last trace ids the GPU wrote
    #[must_use]
    pub fn new(trace_buffer: Option<Rc<GpuBuffer>>) -> Self {
        Self { trace_buffer, ..Self::default() }
    }

    #[must_use]
    pub fn cursor(&self) -> DeltaCursor {
        self.cursor.get()
    }

    /// Whether [`finish`](Self::finish) captured the submitted words
    #[must_use]
    pub fn is_flushed(&self) -> bool {
        self.gfx.borrow().is_some()
    }

    /// Time of the flush, relative to the Unix epoch
    #[must_use]
    pub fn flush_time(&self) -> Option<Duration> {
        self.flush_time.get()
    }

    #[must_use]
    pub fn trace_buffer(&self) -> Option<&GpuBuffer> {
        self.trace_buffer.as_deref()
    }

    /// Linear copy of the graphics stream, available once flushed
    #[must_use]
    pub fn gfx_snapshot(&self) -> Option<Ref<'_, CommandStreamSnapshot>> {
        Ref::filter_map(self.gfx.borrow(), Option::as_ref).ok()
    }

    /// Linear copy of the compute stream, available once flushed
    #[must_use]
    pub fn compute_snapshot(&self) -> Option<Ref<'_, CommandStreamSnapshot>> {
        Ref::filter_map(self.compute.borrow(), Option::as_ref).ok()
    }

    /// Capture the submitted streams at hardware-flush time
    ///
    /// An allocation failure is reported and leaves an empty snapshot behind,
    /// so records still render (as empty) instead of reading a recycled
    /// stream.
    pub fn finish(&self, gfx: &dyn SegmentedStream, compute: Option<&dyn SegmentedStream>) {
        let gfx_copy = capture(gfx, true).unwrap_or_else(|e| {
            error!("{e}");
            CommandStreamSnapshot::default()
        });
        debug!(
            "Saved IB: {} dwords, {} buffers",
            gfx_copy.words.len(),
            gfx_copy.buffer_list.len()
        );
        *self.gfx.borrow_mut() = Some(gfx_copy);

        let compute_copy = compute
            .map(|stream| {
                capture(stream, false).unwrap_or_else(|e| {
                    error!("{e}");
                    CommandStreamSnapshot::default()
                })
            })
            .unwrap_or_default();
        *self.compute.borrow_mut() = Some(compute_copy);

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        self.flush_time.set(Some(now));
    }

    /// Drop the captured copies
    pub fn clear(&self) {
        self.gfx.borrow_mut().take();
        self.compute.borrow_mut().take();
        self.flush_time.set(None);
    }
}

/// Record what the tracked streams gained since the last capture
///
/// Returns `None` (and appends nothing) when neither stream grew and the
/// buffer list is not forced. Otherwise the watermarks advance to the current
/// write positions.
pub fn capture_delta(
    saved: &Rc<SavedCommandStream>,
    streams: &TrackedStreams,
    dump_buffer_list: bool,
    page_size: u64,
) -> Option<CommandStreamChunk> {
    let Some((gfx_cur, compute_cur)) = streams.current_dw() else {
        warn!("Command stream is being encoded, skipping capture");
        return None;
    };
    let cursor = saved.cursor();

    if !dump_buffer_list && gfx_cur == cursor.gfx_last_dw && compute_cur == cursor.compute_last_dw {
        return None;
    }

    let gfx_range = cursor.gfx_last_dw.min(gfx_cur)..gfx_cur;
    let compute_range = cursor.compute_last_dw.min(compute_cur)..compute_cur;
    saved.cursor.set(DeltaCursor { gfx_last_dw: gfx_cur, compute_last_dw: compute_cur });

    Some(CommandStreamChunk::new(
        Rc::clone(saved),
        streams.clone(),
        gfx_range,
        compute_range,
        dump_buffer_list,
        page_size,
    ))
}

/// Record the tracked streams from their first dword, with the buffer list
///
/// Used by the fault report, which must not depend on what earlier flushes
/// already printed. The watermarks still advance.
pub fn capture_full(
    saved: &Rc<SavedCommandStream>,
    streams: &TrackedStreams,
    page_size: u64,
) -> Option<CommandStreamChunk> {
    let Some((gfx_cur, compute_cur)) = streams.current_dw() else {
        warn!("Command stream is being encoded, skipping capture");
        return None;
    };
    saved.cursor.set(DeltaCursor { gfx_last_dw: gfx_cur, compute_last_dw: compute_cur });

    Some(CommandStreamChunk::new(
        Rc::clone(saved),
        streams.clone(),
        0..gfx_cur,
        0..compute_cur,
        true,
        page_size,
    ))
}

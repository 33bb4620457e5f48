//! Ordered, append-only log of deferred records

use log::{debug, warn};
use std::io;

use super::chunk::{ChunkRecord, LogChunk};
use crate::report::Sink;

/// Records waiting to be rendered, in insertion order
#[derive(Default)]
pub struct DeferredLog {
    chunks: Vec<ChunkRecord>,
}

impl DeferredLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a record; no formatting happens here
    pub fn append(&mut self, chunk: impl Into<ChunkRecord>) {
        self.chunks.push(chunk.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Render every record in insertion order, release it, and empty the log
    ///
    /// A record that fails to render does not stop the flush: the remaining
    /// records are still rendered and every record is released.
    ///
    /// Returns the number of records rendered successfully.
    ///
    /// # Errors
    /// Returns the first sink error encountered, after the whole log was
    /// processed
    pub fn flush(&mut self, sink: &mut Sink<'_>) -> io::Result<usize> {
        let mut rendered = 0;
        let mut first_error = None;

        for chunk in self.chunks.drain(..) {
            match chunk.render(sink) {
                Ok(()) => rendered += 1,
                Err(e) => {
                    warn!("Failed to render {} record: {e}", chunk.kind());
                    first_error.get_or_insert(e);
                }
            }
            chunk.release();
        }
        debug!("Flushed {rendered} log records");

        match first_error {
            Some(e) => Err(e),
            None => Ok(rendered),
        }
    }
}

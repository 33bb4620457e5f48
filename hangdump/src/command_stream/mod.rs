//! Command-stream capture
//!
//! - [`stream`]: the segmented stream abstraction and an in-memory buffer
//! - [`snapshot`]: linearization, delta watermarks and the saved-IB handle
//! - [`chunk`]: the lazily rendered log record and the sDMA dump

pub mod chunk;
pub mod snapshot;
pub mod stream;

pub use chunk::{dump_dma, CommandStreamChunk};
pub use snapshot::{
    capture, capture_delta, capture_full, CommandStreamSnapshot, DeltaCursor, SavedCommandStream,
    TrackedStreams,
};
pub use stream::{segments, CommandBuffer, SegmentedStream, SharedStream};

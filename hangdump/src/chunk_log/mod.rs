//! # Deferred Diagnostic Log
//!
//! Capturing driver state must not slow down the draw path, so nothing is
//! formatted when a record is logged. A [`ChunkRecord`] only takes shared
//! (`Rc`) references to the objects it describes; all introspection and text
//! formatting happens when the [`DeferredLog`] is flushed to a sink.
//!
//! ```text
//! draw/dispatch ──► append(ShaderChunk, DescriptorListChunk, CommandStreamChunk)
//!                         │  (O(1), no formatting)
//!                         ▼
//!                   DeferredLog  ──flush(sink)──►  render + release, in order
//! ```
//!
//! Because chunks keep their subjects alive, a shader that the application
//! unbinds (and the pipeline drops) between logging and flushing is still
//! printed correctly.

pub mod chunk;
pub mod deferred_log;

pub use chunk::{ChunkRecord, LogChunk};
pub use deferred_log::DeferredLog;

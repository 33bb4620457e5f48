//! Descriptor-table auditing
//!
//! Descriptors are written by the CPU and uploaded to GPU memory. When the
//! GPU hangs, a descriptor that was overwritten after upload is a common
//! culprit, so each audited slot is printed from the GPU copy and checked
//! against what the driver actually wrote.

pub mod audit;
pub mod layout;
pub mod table;

pub use audit::{audit, DescriptorListChunk, CORRUPTION_LINE};
pub use layout::{
    constbuf_slot, identity, image_slot, sampler_slot, shaderbuf_slot, SlotRemap,
    StageDescriptors, VertexBufferDescriptors, NUM_IMAGE_SLOTS, NUM_SHADER_BUFFERS,
};
pub use table::DescriptorTable;

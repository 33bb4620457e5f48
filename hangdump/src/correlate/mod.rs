//! Disassembly and wave correlation
//!
//! ```text
//! disassembly ──► split ──► [Instruction { text, address, size }]
//!                                   │
//! sorted waves ─────────────────► annotate ──► annotated listing
//!                                                + unmatched waves
//! ```

pub mod annotate;
pub mod split;

pub use annotate::{
    annotate, dump_annotated_shaders, render_annotated, AnnotatedInstruction, CodeSegment,
    WaveState,
};
pub use split::{split_instructions, split_instructions_with_sizes, Instruction};

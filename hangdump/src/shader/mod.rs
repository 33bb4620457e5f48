//! Shader programs
//!
//! - [`binary`]: compiled parts, ELF or plain disassembly
//! - [`program`]: linked programs and the shader log record
//! - [`replace`]: the debugging override that swaps a shader for an ELF file

pub mod binary;
pub mod program;
pub mod replace;

pub use binary::{BinaryImage, ShaderBinary, DISASM_SECTION};
pub use program::{ShaderChunk, ShaderProgram};
pub use replace::{parse_replacements, replace_shader, Replacement, REPLACE_SHADERS_VAR};

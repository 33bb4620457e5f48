//! Compiled shader binaries

use log::warn;
use object::{Object, ObjectSection};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// ELF section the compiler stores the textual disassembly in
pub const DISASM_SECTION: &str = ".AMDGPU.disasm";

/// Payload of a shader binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryImage {
    /// Relocatable ELF object as produced by the compiler
    Elf(Vec<u8>),
    /// Plain disassembly text, one instruction per line
    Disassembly(String),
}

/// One linked part of a shader (prolog, main body, epilog, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderBinary {
    pub image: BinaryImage,
    /// Byte size of every instruction, in disassembly order
    #[serde(default)]
    pub instruction_sizes: Option<Vec<u32>>,
}

impl ShaderBinary {
    #[must_use]
    pub fn from_elf(bytes: Vec<u8>) -> Self {
        Self { image: BinaryImage::Elf(bytes), instruction_sizes: None }
    }

    #[must_use]
    pub fn from_disassembly(text: impl Into<String>) -> Self {
        Self { image: BinaryImage::Disassembly(text.into()), instruction_sizes: None }
    }

    /// Attach the compiler's instruction size table
    #[must_use]
    pub fn with_instruction_sizes(mut self, sizes: Vec<u32>) -> Self {
        self.instruction_sizes = Some(sizes);
        self
    }

    /// Textual disassembly, `None` if the binary carries none
    ///
    /// For ELF images this reads the [`DISASM_SECTION`]. A malformed object
    /// is logged and treated as having no disassembly.
    #[must_use]
    pub fn disassembly(&self) -> Option<Cow<'_, str>> {
        match &self.image {
            BinaryImage::Disassembly(text) => Some(Cow::Borrowed(text.as_str())),
            BinaryImage::Elf(bytes) => elf_disassembly(bytes),
        }
    }
}

fn elf_disassembly(bytes: &[u8]) -> Option<Cow<'_, str>> {
    let obj = match object::File::parse(bytes) {
        Ok(obj) => obj,
        Err(e) => {
            warn!("Shader binary is not a valid ELF object: {e}");
            return None;
        }
    };

    let section = obj.section_by_name(DISASM_SECTION)?;
    let data = match section.data() {
        Ok(data) => data,
        Err(e) => {
            warn!("Failed to read {DISASM_SECTION}: {e}");
            return None;
        }
    };

    // The section is NUL-terminated
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    Some(String::from_utf8_lossy(&data[..end]))
}

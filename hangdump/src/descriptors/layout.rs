//! Standard descriptor layout of a shader stage
//!
//! Each stage owns two tables. Constant and shader buffers share one, with
//! the shader buffers stored in reverse below the constant buffers:
//!
//! ```text
//! slot:  0 ........... 15 | 16 ............
//!        shader buf 15..0 | const buf 0..
//! ```
//!
//! Images and samplers share the other. Images are 8 dwords and stored in
//! reverse in the first half; samplers are 16 dwords and follow.

use crate::domain::{CaptureError, ShaderStage};

use super::audit::{audit, DescriptorListChunk};
use super::table::DescriptorTable;

pub const NUM_SHADER_BUFFERS: u32 = 16;
pub const NUM_IMAGE_SLOTS: u32 = 32;

/// Maps a logical element index to its slot in the table
pub type SlotRemap = fn(u32) -> u32;

#[must_use]
pub fn identity(slot: u32) -> u32 {
    slot
}

#[must_use]
pub fn constbuf_slot(slot: u32) -> u32 {
    NUM_SHADER_BUFFERS + slot
}

/// Shader buffers count down from the last shader-buffer slot
#[must_use]
pub fn shaderbuf_slot(slot: u32) -> u32 {
    (NUM_SHADER_BUFFERS - 1).wrapping_sub(slot)
}

#[must_use]
pub fn sampler_slot(slot: u32) -> u32 {
    NUM_IMAGE_SLOTS / 2 + slot
}

#[must_use]
pub fn image_slot(slot: u32) -> u32 {
    (NUM_IMAGE_SLOTS - 1).wrapping_sub(slot)
}

/// Run of descriptor words printed under one register name
#[derive(Debug, Clone, Copy)]
pub struct WordGroup {
    pub heading: Option<&'static str>,
    pub register: &'static str,
    pub first: usize,
    pub count: usize,
}

const BUF_RSRC: &str = "SQ_BUF_RSRC_WORD";
const IMG_RSRC: &str = "SQ_IMG_RSRC_WORD";
const IMG_SAMP: &str = "SQ_IMG_SAMP_WORD";

const BUFFER_VIEW: &[WordGroup] =
    &[WordGroup { heading: None, register: BUF_RSRC, first: 0, count: 4 }];

const IMAGE_VIEW: &[WordGroup] = &[
    WordGroup { heading: None, register: IMG_RSRC, first: 0, count: 8 },
    WordGroup { heading: Some("Buffer:"), register: BUF_RSRC, first: 4, count: 4 },
];

const COMBINED_SAMPLER: &[WordGroup] = &[
    WordGroup { heading: None, register: IMG_RSRC, first: 0, count: 8 },
    WordGroup { heading: Some("Buffer:"), register: BUF_RSRC, first: 4, count: 4 },
    WordGroup { heading: Some("FMASK:"), register: IMG_RSRC, first: 8, count: 8 },
    WordGroup { heading: Some("Sampler state:"), register: IMG_SAMP, first: 12, count: 4 },
];

/// How the words of a slot are printed, empty for unknown element sizes
#[must_use]
pub fn word_groups(element_dw_size: usize) -> &'static [WordGroup] {
    match element_dw_size {
        4 => BUFFER_VIEW,
        8 => IMAGE_VIEW,
        16 => COMBINED_SAMPLER,
        _ => &[],
    }
}

/// Index of the highest set bit plus one
#[must_use]
pub fn last_bit(mask: u32) -> usize {
    (u32::BITS - mask.leading_zeros()) as usize
}

/// Vertex buffer descriptors uploaded for the bound vertex elements
#[derive(Debug, Clone, Default)]
pub struct VertexBufferDescriptors {
    pub table: DescriptorTable,
    /// Inputs the vertex shader declares
    pub num_inputs: usize,
}

/// Descriptor state bound to one shader stage
#[derive(Debug, Clone, Default)]
pub struct StageDescriptors {
    pub const_and_shader_buffers: DescriptorTable,
    pub samplers_and_images: DescriptorTable,
    pub enabled_constbuf: u32,
    pub enabled_shaderbuf: u32,
    pub enabled_samplers: u32,
    pub enabled_images: u32,
    /// Only consulted for the vertex stage
    pub vertex_buffers: Option<VertexBufferDescriptors>,
}

impl StageDescriptors {
    /// Audit every list of the stage
    ///
    /// Order: vertex buffers, constant buffers, shader buffers, samplers,
    /// images.
    ///
    /// # Errors
    /// Returns [`CaptureError`] if a list cannot be copied
    pub fn audit_all(&self, stage: ShaderStage) -> Result<Vec<DescriptorListChunk>, CaptureError> {
        let name = stage.short_name();
        let mut chunks = Vec::new();

        if stage == ShaderStage::Vertex {
            if let Some(vb) = &self.vertex_buffers {
                let count = vb.num_inputs;
                chunks.extend(audit(&vb.table, name, " - Vertex buffer", 4, count, identity)?);
            }
        }

        let buffers = &self.const_and_shader_buffers;
        let images = &self.samplers_and_images;
        let lists: [(&DescriptorTable, &str, usize, u32, SlotRemap); 4] = [
            (buffers, " - Constant buffer", 4, self.enabled_constbuf, constbuf_slot),
            (buffers, " - Shader buffer", 4, self.enabled_shaderbuf, shaderbuf_slot),
            (images, " - Sampler", 16, self.enabled_samplers, sampler_slot),
            (images, " - Image", 8, self.enabled_images, image_slot),
        ];
        for (table, element, dw_size, enabled, remap) in lists {
            chunks.extend(audit(table, name, element, dw_size, last_bit(enabled), remap)?);
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaps() {
        assert_eq!(constbuf_slot(0), 16);
        assert_eq!(shaderbuf_slot(0), 15);
        assert_eq!(shaderbuf_slot(15), 0);
        assert_eq!(sampler_slot(1), 17);
        assert_eq!(image_slot(0), 31);
    }

    #[test]
    fn test_last_bit() {
        assert_eq!(last_bit(0), 0);
        assert_eq!(last_bit(0b1), 1);
        assert_eq!(last_bit(0b1001_0000), 8);
    }

    #[test]
    fn test_stage_lists_in_order() {
        let buffers = DescriptorTable::new(vec![0; 32 * 4], 4);
        let samplers = DescriptorTable::new(vec![0; 48 * 16], 16);
        let descriptors = StageDescriptors {
            const_and_shader_buffers: buffers,
            samplers_and_images: samplers,
            enabled_constbuf: 0b11,
            enabled_shaderbuf: 0b1,
            enabled_samplers: 0b1,
            enabled_images: 0b1,
            vertex_buffers: Some(VertexBufferDescriptors {
                table: DescriptorTable::new(vec![0; 8], 4),
                num_inputs: 2,
            }),
        };

        let labels: Vec<String> = descriptors
            .audit_all(ShaderStage::Vertex)
            .unwrap()
            .iter()
            .map(DescriptorListChunk::label)
            .collect();
        assert_eq!(
            labels,
            [
                "VS - Vertex buffer",
                "VS - Constant buffer",
                "VS - Shader buffer",
                "VS - Sampler",
                "VS - Image"
            ]
        );

        let fragment = descriptors.audit_all(ShaderStage::Fragment).unwrap();
        assert_eq!(fragment.len(), 4);
    }

    #[test]
    fn test_disabled_lists_are_skipped() {
        let descriptors = StageDescriptors {
            const_and_shader_buffers: DescriptorTable::new(vec![0; 32 * 4], 4),
            enabled_constbuf: 0b1,
            ..StageDescriptors::default()
        };
        let chunks = descriptors.audit_all(ShaderStage::Compute).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].label(), "CS - Constant buffer");
    }
}

//! Replayed device-state captures
//!
//! A capture file is a JSON document describing everything a driver context
//! hands to the diagnostics at hang time: the tracked command streams, the
//! bound shaders and descriptor tables, the in-flight waves, register values
//! and a scripted fault sequence. [`CaptureFile::into_replay`] rebuilds a
//! [`DebugContext`] from it so the same reports can be produced offline.
//!
//! ```json
//! {
//!   "device": { "driver_vendor": "X.Org", "device_vendor": "AMD",
//!               "device_name": "NAVI10", "gfx_level": 10 },
//!   "gfx": { "segments": [[3221366784, 0]], "buffer_list": [] },
//!   "flushed": true,
//!   "shaders": [{ "name": "main", "stage": "fragment", "code_address": 4096,
//!                 "main": { "image": { "disassembly": "s_endpgm ; BF810000" } } }],
//!   "waves": [{ "se": 0, "sh": 0, "cu": 1, "simd": 0, "wave": 2, "pc": 4096 }],
//!   "fault": { "address": 8192, "after_polls": 1, "ring": "gfx" }
//! }
//! ```

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::rc::Rc;

use hangdump_common::{BufferListItem, WaveInfo};

use crate::command_stream::{CommandBuffer, CommandStreamSnapshot, SharedStream, TrackedStreams};
use crate::context::DebugContext;
use crate::descriptors::{DescriptorTable, StageDescriptors, VertexBufferDescriptors};
use crate::device::{DeviceInfo, GpuBuffer, RecordedRegisters, RecordedWaves};
use crate::domain::{CaptureFileError, FaultRing, ReplaceShaderError, ShaderStage};
use crate::fault::ScriptedFaultMonitor;
use crate::shader::{replace_shader, ShaderBinary, ShaderProgram};

const ELF_MAGIC: &[u8] = b"\x7fELF";

/// Recorded segmented command stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCapture {
    /// Segments oldest first; the last one is the live segment
    pub segments: Vec<Vec<u32>>,
    #[serde(default)]
    pub buffer_list: Vec<BufferListItem>,
}

impl StreamCapture {
    fn into_buffer(self) -> CommandBuffer {
        let mut cs = CommandBuffer::from_segments(self.segments);
        for item in self.buffer_list {
            cs.add_buffer(item);
        }
        cs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderCapture {
    /// Index matched against the replacement list; defaults to the position
    /// in `shaders`
    #[serde(default)]
    pub index: Option<u64>,
    pub name: String,
    pub stage: ShaderStage,
    #[serde(default)]
    pub code_address: u64,
    /// Contents of the code buffer; absent when it could not be mapped
    #[serde(default)]
    pub code: Option<Vec<u32>>,
    /// Size in bytes of an unmappable code buffer
    #[serde(default)]
    pub code_size: u64,
    pub main: ShaderBinary,
    #[serde(default)]
    pub prolog: Option<ShaderBinary>,
    #[serde(default)]
    pub previous_stage: Option<ShaderBinary>,
    #[serde(default)]
    pub prolog2: Option<ShaderBinary>,
    #[serde(default)]
    pub epilog: Option<ShaderBinary>,
    #[serde(default)]
    pub shader_log: Option<String>,
}

/// Recorded descriptor table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCapture {
    /// CPU-side list
    pub list: Vec<u32>,
    /// GPU-side copy, absent when it was not uploaded or not mappable
    #[serde(default)]
    pub gpu_list: Option<Vec<u32>>,
    #[serde(default)]
    pub gpu_address: u64,
    pub element_dw_size: usize,
    #[serde(default)]
    pub first_active_slot: Option<usize>,
    #[serde(default)]
    pub num_active_slots: Option<usize>,
}

impl TableCapture {
    fn validate(&self, what: &str) -> Result<(), CaptureFileError> {
        if self.element_dw_size == 0 {
            if self.list.is_empty() {
                return Ok(());
            }
            return Err(CaptureFileError::InvalidCapture(format!(
                "{what}: element_dw_size is 0 for a non-empty list"
            )));
        }
        if self.list.len() % self.element_dw_size != 0 {
            return Err(CaptureFileError::InvalidCapture(format!(
                "{what}: {} dwords is not a multiple of element_dw_size {}",
                self.list.len(),
                self.element_dw_size
            )));
        }

        let slots = self.list.len() / self.element_dw_size;
        let first = self.first_active_slot.unwrap_or(0);
        let active_end = first.checked_add(self.num_active_slots.unwrap_or(0));
        if first > slots || active_end.map_or(true, |end| end > slots) {
            return Err(CaptureFileError::InvalidCapture(format!(
                "{what}: active slots {first}+{} exceed the {slots} slots of the list",
                self.num_active_slots.unwrap_or(0)
            )));
        }
        Ok(())
    }

    fn into_table(self) -> DescriptorTable {
        let slots = self.list.len().checked_div(self.element_dw_size).unwrap_or(0);
        let first = self.first_active_slot.unwrap_or(0);
        let count = self.num_active_slots.unwrap_or(slots.saturating_sub(first));

        let mut table =
            DescriptorTable::new(self.list, self.element_dw_size).with_active_slots(first, count);
        if let Some(words) = self.gpu_list {
            table = table.with_gpu_list(Rc::new(GpuBuffer::mapped(self.gpu_address, words)));
        }
        table
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexBufferCapture {
    pub table: TableCapture,
    pub num_inputs: usize,
}

/// Descriptor state of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCapture {
    pub stage: ShaderStage,
    #[serde(default)]
    pub const_and_shader_buffers: TableCapture,
    #[serde(default)]
    pub samplers_and_images: TableCapture,
    #[serde(default)]
    pub enabled_constbuf: u32,
    #[serde(default)]
    pub enabled_shaderbuf: u32,
    #[serde(default)]
    pub enabled_samplers: u32,
    #[serde(default)]
    pub enabled_images: u32,
    #[serde(default)]
    pub vertex_buffers: Option<VertexBufferCapture>,
}

impl StageCapture {
    fn into_descriptors(self) -> StageDescriptors {
        StageDescriptors {
            const_and_shader_buffers: self.const_and_shader_buffers.into_table(),
            samplers_and_images: self.samplers_and_images.into_table(),
            enabled_constbuf: self.enabled_constbuf,
            enabled_shaderbuf: self.enabled_shaderbuf,
            enabled_samplers: self.enabled_samplers,
            enabled_images: self.enabled_images,
            vertex_buffers: self.vertex_buffers.map(|vb| VertexBufferDescriptors {
                table: vb.table.into_table(),
                num_inputs: vb.num_inputs,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterCapture {
    pub offset: u32,
    pub value: u32,
}

/// The fault the kernel will report during replay
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FaultCapture {
    pub address: u64,
    /// Quiet polls before the fault shows up
    #[serde(default)]
    pub after_polls: usize,
    #[serde(default)]
    pub ring: FaultRing,
}

/// A complete device-state capture
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureFile {
    #[serde(default)]
    pub device: DeviceInfo,
    pub gfx: StreamCapture,
    #[serde(default)]
    pub compute: Option<StreamCapture>,
    /// The IB was submitted to the hardware
    #[serde(default)]
    pub flushed: bool,
    /// Trace-buffer contents: last gfx and compute trace IDs
    #[serde(default)]
    pub trace_ids: Option<Vec<u32>>,
    #[serde(default)]
    pub shaders: Vec<ShaderCapture>,
    #[serde(default)]
    pub descriptors: Vec<StageCapture>,
    #[serde(default)]
    pub rw_buffers: Option<TableCapture>,
    #[serde(default)]
    pub waves: Vec<WaveInfo>,
    #[serde(default)]
    pub registers: Vec<RegisterCapture>,
    #[serde(default)]
    pub apitrace_call_number: u32,
    #[serde(default)]
    pub fault: Option<FaultCapture>,
    /// Last sDMA IB, for faults on the DMA ring
    #[serde(default)]
    pub dma_ib: Option<StreamCapture>,
}

/// A driver context rebuilt from a capture
pub struct Replay {
    pub context: DebugContext,
    pub monitor: ScriptedFaultMonitor,
    pub fault_ring: FaultRing,
    pub dma_ib: Option<CommandStreamSnapshot>,
    /// The IB should be flushed before reporting
    pub flushed: bool,
}

impl CaptureFile {
    /// Read and validate a capture
    ///
    /// # Errors
    /// Returns [`CaptureFileError`] if the file cannot be read, is not valid
    /// JSON, or describes inconsistent descriptor tables
    pub fn load(path: &Path) -> Result<Self, CaptureFileError> {
        let content = std::fs::read_to_string(path)?;
        let capture = Self::parse(&content)?;
        debug!(
            "Loaded capture {}: {} shaders, {} waves",
            path.display(),
            capture.shaders.len(),
            capture.waves.len()
        );
        Ok(capture)
    }

    /// Parse and validate capture JSON
    ///
    /// # Errors
    /// Returns [`CaptureFileError`] for invalid JSON or inconsistent tables
    pub fn parse(content: &str) -> Result<Self, CaptureFileError> {
        let capture: Self = serde_json::from_str(content)?;
        capture.validate()?;
        Ok(capture)
    }

    fn validate(&self) -> Result<(), CaptureFileError> {
        if let Some(rw) = &self.rw_buffers {
            rw.validate("rw_buffers")?;
        }
        for stage in &self.descriptors {
            let name = stage.stage.short_name();
            stage.const_and_shader_buffers.validate(&format!("{name} buffers"))?;
            stage.samplers_and_images.validate(&format!("{name} samplers"))?;
            if let Some(vb) = &stage.vertex_buffers {
                vb.table.validate(&format!("{name} vertex buffers"))?;
            }
        }
        Ok(())
    }

    /// Rebuild the driver context
    ///
    /// `replace_list` is the shader override list; a shader whose index it
    /// names gets its main part loaded from the given file.
    ///
    /// # Errors
    /// Returns [`ReplaceShaderError::Malformed`] for a bad override list.
    /// Unreadable replacement files are logged and the captured shader kept.
    pub fn into_replay(self, replace_list: Option<&str>) -> Result<Replay, ReplaceShaderError> {
        let gfx: SharedStream = self.gfx.into_buffer().into_shared();
        let compute = self.compute.map(|c| -> SharedStream { c.into_buffer().into_shared() });
        let trace_buffer = self.trace_ids.map(|ids| Rc::new(GpuBuffer::mapped(0, ids)));

        let mut ctx =
            DebugContext::new(self.device, TrackedStreams::new(gfx, compute), trace_buffer);
        ctx.apitrace_call_number = self.apitrace_call_number;

        for (position, shader) in self.shaders.into_iter().enumerate() {
            let index = shader.index.unwrap_or(position as u64);
            let stage = shader.stage;
            let program = build_shader(shader, index, replace_list)?;
            ctx.bind_shader(stage, Some(Rc::new(program)));
        }

        for stage in self.descriptors {
            let which = stage.stage;
            ctx.set_descriptors(which, stage.into_descriptors());
        }
        if let Some(rw) = self.rw_buffers {
            ctx.set_rw_buffers(rw.into_table());
        }

        if !self.waves.is_empty() {
            ctx.set_wave_source(Box::new(RecordedWaves(self.waves)));
        }
        if !self.registers.is_empty() {
            let values = self.registers.iter().map(|r| (r.offset, r.value)).collect();
            ctx.set_register_reader(Box::new(RecordedRegisters(values)));
        }

        let (monitor, fault_ring) = match self.fault {
            Some(fault) => {
                (ScriptedFaultMonitor::fault_after(fault.after_polls, fault.address), fault.ring)
            }
            None => (ScriptedFaultMonitor::default(), FaultRing::default()),
        };

        let dma_ib = self.dma_ib.map(|ib| CommandStreamSnapshot {
            words: ib.segments.concat(),
            buffer_list: ib.buffer_list,
        });

        Ok(Replay { context: ctx, monitor, fault_ring, dma_ib, flushed: self.flushed })
    }
}

fn build_shader(
    shader: ShaderCapture,
    index: u64,
    replace_list: Option<&str>,
) -> Result<ShaderProgram, ReplaceShaderError> {
    let main = match replace_shader(replace_list, index) {
        Ok(Some(bytes)) => replacement_binary(bytes),
        Ok(None) => shader.main,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!("Keeping the captured shader {index}: {e}");
            shader.main
        }
    };

    let code = match shader.code {
        Some(words) => GpuBuffer::mapped(shader.code_address, words),
        None => GpuBuffer::unmappable(shader.code_address, shader.code_size),
    };

    let mut program = ShaderProgram::new(shader.name, shader.stage, code, main);
    program.prolog = shader.prolog;
    program.previous_stage = shader.previous_stage;
    program.prolog2 = shader.prolog2;
    program.epilog = shader.epilog;
    program.shader_log = shader.shader_log;
    Ok(program)
}

fn replacement_binary(bytes: Vec<u8>) -> ShaderBinary {
    if bytes.starts_with(ELF_MAGIC) {
        ShaderBinary::from_elf(bytes)
    } else {
        info!("Replacement is not an ELF image, using it as disassembly");
        ShaderBinary::from_disassembly(String::from_utf8_lossy(&bytes).into_owned())
    }
}

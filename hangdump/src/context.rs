//! Driver-context facade
//!
//! [`DebugContext`] is what a driver context owns when debugging is enabled:
//! the tracked command streams, the saved-IB handle of the IB being built,
//! the bound shaders and descriptors, and the optional deferred log that
//! draw-time records accumulate in.
//!
//! # Lifecycle of one IB
//!
//! ```text
//! new IB ──► log_cs()* ──► flush_hw() ──► new IB ...
//!              │              │
//!              │              └─ finish(): linear copy + buffer list
//!              └─ delta since the previous log_cs()
//! ```

use log::{debug, error, warn};
use std::io::{self, Write};
use std::rc::Rc;

use crate::chunk_log::DeferredLog;
use crate::command_stream::{capture_delta, capture_full, SavedCommandStream, TrackedStreams};
use crate::correlate;
use crate::descriptors::{audit, identity, DescriptorListChunk, DescriptorTable, StageDescriptors};
use crate::device::{status_registers, DeviceInfo, GpuBuffer, RegisterReader, WaveIntrospection};
use crate::domain::{CaptureError, ReportError, ShaderStage};
use crate::fault::ReportTarget;
use crate::report::Sink;
use crate::shader::{ShaderChunk, ShaderProgram};
use crate::system_dump::{self, WAVE_DUMPS};

/// What [`DebugContext::dump_debug_state`] includes besides the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpFlags {
    /// Status registers and annotated shaders
    pub device_status: bool,
    /// Output of external wave-dump tools
    pub system_dumps: bool,
}

/// Debug state of one driver context
pub struct DebugContext {
    pub device: DeviceInfo,
    log: Option<DeferredLog>,
    streams: TrackedStreams,
    saved: Rc<SavedCommandStream>,
    trace_buffer: Option<Rc<GpuBuffer>>,
    shaders: [Option<Rc<ShaderProgram>>; 6],
    descriptors: [StageDescriptors; 6],
    rw_buffers: DescriptorTable,
    waves: Option<Box<dyn WaveIntrospection>>,
    registers: Option<Box<dyn RegisterReader>>,
    /// Call number of the last traced API call, 0 if not traced
    pub apitrace_call_number: u32,
    /// Append a hexdump of the code buffer to shader records
    pub dump_shader_binary: bool,
}

impl DebugContext {
    #[must_use]
    pub fn new(
        device: DeviceInfo,
        streams: TrackedStreams,
        trace_buffer: Option<Rc<GpuBuffer>>,
    ) -> Self {
        Self {
            device,
            log: None,
            streams,
            saved: Rc::new(SavedCommandStream::new(trace_buffer.clone())),
            trace_buffer,
            shaders: Default::default(),
            descriptors: Default::default(),
            rw_buffers: DescriptorTable::default(),
            waves: None,
            registers: None,
            apitrace_call_number: 0,
            dump_shader_binary: false,
        }
    }

    /// Start accumulating draw-time records
    pub fn enable_log(&mut self) {
        self.log.get_or_insert_with(DeferredLog::new);
    }

    #[must_use]
    pub fn log(&self) -> Option<&DeferredLog> {
        self.log.as_ref()
    }

    pub fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Rc<ShaderProgram>>) {
        self.shaders[stage.index()] = shader;
    }

    #[must_use]
    pub fn bound_shader(&self, stage: ShaderStage) -> Option<&Rc<ShaderProgram>> {
        self.shaders[stage.index()].as_ref()
    }

    pub fn set_descriptors(&mut self, stage: ShaderStage, descriptors: StageDescriptors) {
        self.descriptors[stage.index()] = descriptors;
    }

    pub fn set_rw_buffers(&mut self, table: DescriptorTable) {
        self.rw_buffers = table;
    }

    pub fn set_wave_source(&mut self, waves: Box<dyn WaveIntrospection>) {
        self.waves = Some(waves);
    }

    pub fn set_register_reader(&mut self, registers: Box<dyn RegisterReader>) {
        self.registers = Some(registers);
    }

    /// Handle of the IB currently being built
    #[must_use]
    pub fn saved(&self) -> &Rc<SavedCommandStream> {
        &self.saved
    }

    #[must_use]
    pub fn streams(&self) -> &TrackedStreams {
        &self.streams
    }

    fn page_size(&self) -> u64 {
        self.device.gart_page_size
    }

    fn log_shader(&self, log: &mut DeferredLog, stage: ShaderStage) {
        if let Some(shader) = self.bound_shader(stage) {
            log.append(ShaderChunk::new(Rc::clone(shader), self.dump_shader_binary));
        }
    }

    fn log_descriptor_lists(
        log: &mut DeferredLog,
        lists: Result<Vec<DescriptorListChunk>, CaptureError>,
    ) {
        match lists {
            Ok(chunks) => chunks.into_iter().for_each(|chunk| log.append(chunk)),
            Err(e) => error!("{e}"),
        }
    }

    fn log_stage_descriptors(&self, log: &mut DeferredLog, stage: ShaderStage) {
        if self.bound_shader(stage).is_some() {
            Self::log_descriptor_lists(log, self.descriptors[stage.index()].audit_all(stage));
        }
    }

    /// Record the bound graphics shaders and their descriptors
    ///
    /// Order: every bound graphics shader, the RW buffers, then the
    /// descriptors of each bound graphics stage.
    pub fn log_draw_state(&self, log: &mut DeferredLog) {
        for stage in ShaderStage::GRAPHICS {
            self.log_shader(log, stage);
        }

        let rw = audit(
            &self.rw_buffers,
            "",
            "RW buffers",
            4,
            self.rw_buffers.num_active_slots,
            identity,
        );
        Self::log_descriptor_lists(log, rw.map(|chunk| chunk.into_iter().collect()));

        for stage in ShaderStage::GRAPHICS {
            self.log_stage_descriptors(log, stage);
        }
    }

    /// Record the bound compute shader and its descriptors
    pub fn log_compute_state(&self, log: &mut DeferredLog) {
        self.log_shader(log, ShaderStage::Compute);
        self.log_stage_descriptors(log, ShaderStage::Compute);
    }

    /// Record what the streams gained since the last call
    pub fn log_cs(&self, log: &mut DeferredLog, dump_buffer_list: bool) {
        if let Some(chunk) =
            capture_delta(&self.saved, &self.streams, dump_buffer_list, self.page_size())
        {
            log.append(chunk);
        }
    }

    /// Record the streams from their first dword, with the buffer list
    ///
    /// Returns `false` if nothing was recorded because a stream is being
    /// encoded.
    pub fn log_cs_full(&self, log: &mut DeferredLog) -> bool {
        match capture_full(&self.saved, &self.streams, self.page_size()) {
            Some(chunk) => {
                log.append(chunk);
                true
            }
            None => false,
        }
    }

    /// Delta of the streams into the context's own log, if enabled
    pub fn auto_log_cs(&mut self) {
        if let Some(mut log) = self.log.take() {
            self.log_cs(&mut log, false);
            self.log = Some(log);
        }
    }

    /// Draw state and stream delta into the context's own log, if enabled
    pub fn auto_log_draw_state(&mut self) {
        if let Some(mut log) = self.log.take() {
            self.log_draw_state(&mut log);
            self.log_cs(&mut log, false);
            self.log = Some(log);
        }
    }

    /// Compute state and stream delta into the context's own log, if enabled
    pub fn auto_log_compute_state(&mut self) {
        if let Some(mut log) = self.log.take() {
            self.log_compute_state(&mut log);
            self.log_cs(&mut log, false);
            self.log = Some(log);
        }
    }

    /// The IB was handed to the hardware
    ///
    /// Saves a linear copy of the streams into the current handle and logs
    /// the final delta with the buffer list. With `aux_target` the whole log
    /// is written out immediately, for contexts no outer debug layer
    /// captures. A fresh handle is started for the next IB; resetting the
    /// streams themselves is the encoder's job.
    ///
    /// # Errors
    /// Returns [`ReportError`] if the aux dump cannot be written
    pub fn flush_hw(
        &mut self,
        aux_target: Option<&mut dyn ReportTarget>,
    ) -> Result<(), ReportError> {
        self.finish_current_ib();

        let mut result = Ok(());
        if let Some(mut log) = self.log.take() {
            self.log_cs(&mut log, true);
            if let Some(target) = aux_target {
                result = self.write_aux_dump(&mut log, target);
            }
            self.log = Some(log);
        }

        self.saved = Rc::new(SavedCommandStream::new(self.trace_buffer.clone()));
        result
    }

    /// Capture the submitted words into the current handle
    pub fn finish_current_ib(&self) {
        let Ok(gfx) = self.streams.gfx.try_borrow() else {
            warn!("Command stream is being encoded, IB not saved");
            return;
        };
        match &self.streams.compute {
            Some(compute) => match compute.try_borrow() {
                Ok(compute) => self.saved.finish(&*gfx, Some(&*compute)),
                Err(_) => {
                    warn!("Compute IB is being encoded, saving the gfx IB only");
                    self.saved.finish(&*gfx, None);
                }
            },
            None => self.saved.finish(&*gfx, None),
        }
    }

    fn write_aux_dump(
        &self,
        log: &mut DeferredLog,
        target: &mut dyn ReportTarget,
    ) -> Result<(), ReportError> {
        let location = target.location();
        let mut out = target
            .open()
            .map_err(|source| ReportError::OpenFailed { path: location.clone(), source })?;
        let mut sink = Sink::plain(&mut *out);

        write_device_header(&self.device, &mut sink)?;
        write!(sink, "Aux context dump:\n\n")?;
        log.flush(&mut sink)?;
        sink.flush()?;
        debug!("Wrote aux context dump to {}", location.display());
        Ok(())
    }

    /// Render and empty the context's own log
    ///
    /// # Errors
    /// Returns the first sink error
    pub fn flush_log(&mut self, sink: &mut Sink<'_>) -> io::Result<usize> {
        match self.log.as_mut() {
            Some(log) => log.flush(sink),
            None => Ok(0),
        }
    }

    /// Everything known about the device state, for a hang report
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn dump_debug_state(&mut self, sink: &mut Sink<'_>, flags: DumpFlags) -> io::Result<()> {
        self.flush_log(sink)?;

        if flags.device_status {
            self.dump_registers(sink)?;
            self.dump_annotated_shaders(sink)?;
            if flags.system_dumps {
                system_dump::dump_all(WAVE_DUMPS, sink)?;
            }
        }
        Ok(())
    }

    /// Memory-mapped status registers, skipped without a register source
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn dump_registers(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        let Some(registers) = &self.registers else {
            return Ok(());
        };

        writeln!(sink, "Memory-mapped registers:")?;
        for (name, offset) in status_registers(self.device.gfx_level) {
            if let Some(value) = registers.read_register(offset) {
                writeln!(sink, "        {name} <- 0x{value:08x}")?;
            }
        }
        writeln!(sink)
    }

    /// Correlate the live waves with the bound shaders
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn dump_annotated_shaders(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        let waves = self.waves.as_ref().map(|source| source.waves()).unwrap_or_default();
        let shaders = ShaderStage::ALL.iter().filter_map(|stage| self.bound_shader(*stage));
        correlate::dump_annotated_shaders(shaders.map(|shader| &**shader), waves, sink)
    }
}

/// Driver and device identity lines
///
/// # Errors
/// Returns an error if the sink fails
pub fn write_device_header(device: &DeviceInfo, sink: &mut Sink<'_>) -> io::Result<()> {
    writeln!(sink, "Driver vendor: {}", device.driver_vendor)?;
    writeln!(sink, "Device vendor: {}", device.device_vendor)?;
    writeln!(sink, "Device name: {}\n", device.device_name)
}

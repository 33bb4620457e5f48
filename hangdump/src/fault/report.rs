//! Fault reports and where they are written

use log::debug;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use super::monitor::VmFault;
use crate::chunk_log::DeferredLog;
use crate::command_stream::{dump_dma, CommandStreamSnapshot};
use crate::context::{write_device_header, DebugContext};
use crate::domain::FaultRing;
use crate::report::Sink;

/// Destination of a one-off report
pub trait ReportTarget {
    /// Open a fresh output for one report
    ///
    /// # Errors
    /// Returns an error if the output cannot be created
    fn open(&mut self) -> io::Result<Box<dyn Write + '_>>;

    /// Where the next report goes, for messages
    fn location(&self) -> PathBuf;
}

impl ReportTarget for Vec<u8> {
    fn open(&mut self) -> io::Result<Box<dyn Write + '_>> {
        Ok(Box::new(self))
    }

    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }
}

/// Directory receiving numbered dump files
#[derive(Debug, Clone)]
pub struct DebugDumpDir {
    dir: PathBuf,
    prefix: String,
    next_index: u32,
}

impl DebugDumpDir {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let prefix = format!("hangdump_{}", std::process::id());
        Self { dir: dir.into(), prefix, next_index: 0 }
    }

    /// `$HOME/hangdump_dumps`, or the working directory without `HOME`
    #[must_use]
    pub fn default_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join("hangdump_dumps")
    }
}

impl ReportTarget for DebugDumpDir {
    fn open(&mut self) -> io::Result<Box<dyn Write + '_>> {
        fs::create_dir_all(&self.dir)?;
        let path = self.location();
        let file = File::create(&path)?;
        self.next_index += 1;
        debug!("Writing report to {}", path.display());
        Ok(Box::new(BufWriter::new(file)))
    }

    fn location(&self) -> PathBuf {
        self.dir.join(format!("{}_{:08}", self.prefix, self.next_index))
    }
}

/// Write the report for a detected VM fault
///
/// For the graphics ring this is the draw and compute state followed by the
/// whole current IB with its buffer list and the annotated shaders. For the
/// DMA ring it is the saved sDMA IB.
///
/// # Errors
/// Returns an error if the sink fails
pub fn write_fault_report(
    ctx: &DebugContext,
    fault: VmFault,
    ring: FaultRing,
    dma_ib: Option<&CommandStreamSnapshot>,
    sink: &mut Sink<'_>,
) -> io::Result<()> {
    write!(sink, "VM fault report.\n\n")?;
    let command: Vec<String> = std::env::args().collect();
    if !command.is_empty() {
        writeln!(sink, "Command: {}", command.join(" "))?;
    }
    write_device_header(&ctx.device, sink)?;
    write!(sink, "Failing VM page: 0x{:08x}\n\n", fault.address)?;

    if ctx.apitrace_call_number != 0 {
        write!(sink, "Last apitrace call: {}\n\n", ctx.apitrace_call_number)?;
    }

    match ring {
        FaultRing::Gfx => {
            let mut log = DeferredLog::new();
            ctx.log_draw_state(&mut log);
            ctx.log_compute_state(&mut log);
            let captured = ctx.log_cs_full(&mut log);
            log.flush(sink)?;
            if !captured {
                write!(sink, "(IB unavailable, command stream busy)\n\n")?;
            }
            ctx.dump_annotated_shaders(sink)?;
        }
        FaultRing::Dma => match dma_ib {
            Some(ib) => dump_dma(ib, ctx.device.gart_page_size, sink)?,
            None => writeln!(sink, "(no sDMA IB saved)")?,
        },
        FaultRing::Other => {}
    }
    Ok(())
}

//! # hangdump - Main Entry Point
//!
//! Replays a captured driver context and renders its diagnostics:
//! - **Hang report** (default): the deferred log, optionally followed by
//!   registers, annotated shaders and external wave dumps
//! - **Fault check** (`--watch-faults`): polls for a VM fault after the IB
//!   was submitted and writes a fault report to the dump directory

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};

use hangdump::capture_file::{CaptureFile, Replay};
use hangdump::cli::Args;
use hangdump::command_stream::CommandStreamSnapshot;
use hangdump::context::{DebugContext, DumpFlags};
use hangdump::domain::{FaultRing, ShaderStage};
use hangdump::fault::{
    DebugDumpDir, DmesgFaultMonitor, FaultMonitor, FaultOrchestrator, PollOutcome, ReportTarget,
};
use hangdump::report::Sink;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_VM_FAULT: i32 = 3;

/// How a successful run ended
enum Completion {
    Reported,
    VmFault,
}

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(Completion::Reported) => EXIT_SUCCESS,
        Ok(Completion::VmFault) => {
            eprintln!("Detected a VM fault, exiting...");
            EXIT_VM_FAULT
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_ERROR
        }
    });
}

fn run() -> Result<Completion> {
    let args = Args::parse();

    let capture = CaptureFile::load(&args.capture)
        .with_context(|| format!("Failed to load capture {}", args.capture.display()))?;
    let Replay { context: mut ctx, monitor, fault_ring, dma_ib, flushed } =
        capture.into_replay(args.replace_shaders.as_deref())?;

    ctx.dump_shader_binary = args.dump_shader_binary;
    ctx.enable_log();
    ctx.auto_log_draw_state();
    if ctx.bound_shader(ShaderStage::Compute).is_some() {
        ctx.auto_log_compute_state();
    }

    let dump_dir = args.dump_dir.clone().unwrap_or_else(DebugDumpDir::default_dir);
    let mut reports = DebugDumpDir::new(dump_dir);

    if flushed {
        let aux: Option<&mut dyn ReportTarget> =
            if args.aux_dump { Some(&mut reports) } else { None };
        ctx.flush_hw(aux).context("Failed to write aux context dump")?;
    }

    if args.watch_faults {
        let colored = args.color.enabled(false);
        let watch = FaultWatch { ctx: &ctx, ring: fault_ring, dma_ib: dma_ib.as_ref(), colored };
        let outcome = if args.dmesg {
            watch.run(DmesgFaultMonitor::new(ctx.device.gfx_level), args.polls, &mut reports)
        } else {
            watch.run(monitor, args.polls, &mut reports)
        };
        if outcome == PollOutcome::MustExit {
            return Ok(Completion::VmFault);
        }
        info!("No VM fault after {} checks", args.polls);
    }

    let flags = DumpFlags { device_status: args.device_status, system_dumps: args.system_dumps };
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            let mut out = BufWriter::new(file);
            write_report(&mut ctx, &mut out, args.color.enabled(false), flags)?;
            info!("Report written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let colored = args.color.enabled(stdout.is_terminal());
            write_report(&mut ctx, &mut stdout.lock(), colored, flags)?;
        }
    }

    Ok(Completion::Reported)
}

/// Everything a fault report needs besides the monitor
struct FaultWatch<'a> {
    ctx: &'a DebugContext,
    ring: FaultRing,
    dma_ib: Option<&'a CommandStreamSnapshot>,
    colored: bool,
}

impl FaultWatch<'_> {
    fn run<M: FaultMonitor>(
        &self,
        monitor: M,
        polls: usize,
        target: &mut dyn ReportTarget,
    ) -> PollOutcome {
        let mut orchestrator = FaultOrchestrator::new(monitor).with_color(self.colored);
        for attempt in 0..polls {
            debug!("VM fault check {}/{polls}", attempt + 1);
            if orchestrator.poll(self.ctx, self.ring, self.dma_ib, target) == PollOutcome::MustExit
            {
                return PollOutcome::MustExit;
            }
        }
        PollOutcome::Continue
    }
}

fn write_report(
    ctx: &mut DebugContext,
    out: &mut dyn Write,
    colored: bool,
    flags: DumpFlags,
) -> Result<()> {
    let mut sink = Sink::new(out, colored);
    ctx.dump_debug_state(&mut sink, flags).context("Failed to write report")?;
    sink.flush().context("Failed to write report")?;
    Ok(())
}

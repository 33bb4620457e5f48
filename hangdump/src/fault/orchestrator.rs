//! Fault-triggered capture
//!
//! ```text
//!            poll: no fault
//!           ┌──────────────┐
//!           ▼              │
//!  new ──► Armed ──────────┘
//!           │
//!           │ poll: fault ─► write report
//!           ▼
//!        Faulted ──► every poll: MustExit
//! ```
//!
//! A detected fault leaves the device unusable, so the orchestrator captures
//! exactly once and then only tells the caller to stop. Exiting is left to
//! the caller.

use log::{error, info};
use std::io::Write;

use super::monitor::{FaultCursor, FaultMonitor, VmFault};
use super::report::{write_fault_report, ReportTarget};
use crate::command_stream::CommandStreamSnapshot;
use crate::context::DebugContext;
use crate::domain::FaultRing;
use crate::report::Sink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Armed,
    /// Terminal
    Faulted,
}

/// What the caller must do after a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Continue,
    MustExit,
}

/// Watches a [`FaultMonitor`] and writes one report on the first fault
pub struct FaultOrchestrator<M: FaultMonitor> {
    monitor: M,
    cursor: FaultCursor,
    state: OrchestratorState,
    fault: Option<VmFault>,
    colored: bool,
}

impl<M: FaultMonitor> FaultOrchestrator<M> {
    /// Arm `monitor`: faults that already happened are ignored
    pub fn new(mut monitor: M) -> Self {
        let mut cursor = FaultCursor::default();
        monitor.arm(&mut cursor);
        Self { monitor, cursor, state: OrchestratorState::Armed, fault: None, colored: false }
    }

    /// Write reports with ANSI colours
    #[must_use]
    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The fault that was reported, once faulted
    #[must_use]
    pub fn fault(&self) -> Option<VmFault> {
        self.fault
    }

    #[must_use]
    pub fn monitor(&self) -> &M {
        &self.monitor
    }

    /// Check for a fault after a submission on `ring`
    ///
    /// `dma_ib` is the saved sDMA IB, consulted for faults on the DMA ring.
    /// A report that cannot be written is logged; the orchestrator still
    /// moves to [`OrchestratorState::Faulted`].
    pub fn poll(
        &mut self,
        ctx: &DebugContext,
        ring: FaultRing,
        dma_ib: Option<&CommandStreamSnapshot>,
        target: &mut dyn ReportTarget,
    ) -> PollOutcome {
        if self.state == OrchestratorState::Faulted {
            return PollOutcome::MustExit;
        }

        let Some(fault) = self.monitor.poll(&mut self.cursor) else {
            return PollOutcome::Continue;
        };
        self.state = OrchestratorState::Faulted;
        self.fault = Some(fault);

        let location = target.location();
        match target.open() {
            Ok(mut out) => {
                let mut sink = Sink::new(&mut *out, self.colored);
                let written = write_fault_report(ctx, fault, ring, dma_ib, &mut sink)
                    .and_then(|()| sink.flush());
                match written {
                    Ok(()) => info!("VM fault report written to {}", location.display()),
                    Err(e) => error!("Failed to write VM fault report: {e}"),
                }
            }
            Err(e) => error!("Failed to open {}: {e}", location.display()),
        }

        PollOutcome::MustExit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_stream::{CommandBuffer, SharedStream, TrackedStreams};
    use crate::device::DeviceInfo;
    use crate::fault::ScriptedFaultMonitor;
    use std::io;
    use std::path::PathBuf;

    fn context() -> DebugContext {
        let gfx = CommandBuffer::from_segments(vec![vec![0xc0de]]).into_shared();
        let shared: SharedStream = gfx;
        DebugContext::new(DeviceInfo::default(), TrackedStreams::new(shared, None), None)
    }

    struct Unwritable;

    impl ReportTarget for Unwritable {
        fn open(&mut self) -> io::Result<Box<dyn Write + '_>> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }

        fn location(&self) -> PathBuf {
            PathBuf::from("/unwritable")
        }
    }

    #[test]
    fn test_quiet_monitor_keeps_armed() {
        let ctx = context();
        let mut orchestrator = FaultOrchestrator::new(ScriptedFaultMonitor::new([None, None]));
        let mut target = Vec::<u8>::new();

        let outcome = orchestrator.poll(&ctx, FaultRing::Gfx, None, &mut target);
        assert_eq!(outcome, PollOutcome::Continue);
        assert_eq!(orchestrator.state(), OrchestratorState::Armed);
        assert!(target.is_empty());
    }

    #[test]
    fn test_dma_fault_dumps_saved_ib() {
        let ctx = context();
        let mut orchestrator = FaultOrchestrator::new(ScriptedFaultMonitor::fault_after(0, 0x7000));
        let ib = CommandStreamSnapshot { words: vec![0x1234_5678], buffer_list: Vec::new() };
        let mut target = Vec::<u8>::new();

        let outcome = orchestrator.poll(&ctx, FaultRing::Dma, Some(&ib), &mut target);
        let text = String::from_utf8(target).unwrap();

        assert_eq!(outcome, PollOutcome::MustExit);
        assert!(text.contains("Failing VM page: 0x00007000"));
        assert!(text.contains(" 12345678\n"));
        assert!(text.ends_with("SDMA Dump Done.\n"));
    }

    #[test]
    fn test_unopenable_target_still_faults() {
        let ctx = context();
        let mut orchestrator = FaultOrchestrator::new(ScriptedFaultMonitor::fault_after(0, 0x1000));

        let outcome = orchestrator.poll(&ctx, FaultRing::Gfx, None, &mut Unwritable);
        assert_eq!(outcome, PollOutcome::MustExit);
        assert_eq!(orchestrator.state(), OrchestratorState::Faulted);
        assert_eq!(orchestrator.fault(), Some(VmFault { address: 0x1000 }));
    }
}

//! VM fault detection and fault-triggered reports
//!
//! - [`monitor`]: the [`FaultMonitor`] seam and a scripted monitor for replay
//! - [`dmesg`]: fault lines in the kernel log
//! - [`report`]: the fault report and the files it is written to
//! - [`orchestrator`]: the Armed/Faulted state machine tying them together

pub mod dmesg;
pub mod monitor;
pub mod orchestrator;
pub mod report;

pub use dmesg::{parse_dmesg, DmesgFaultMonitor};
pub use monitor::{FaultCursor, FaultMonitor, ScriptedFaultMonitor, VmFault};
pub use orchestrator::{FaultOrchestrator, OrchestratorState, PollOutcome};
pub use report::{write_fault_report, DebugDumpDir, ReportTarget};

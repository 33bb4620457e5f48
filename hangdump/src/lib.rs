//! # hangdump - Deferred GPU Diagnostics and Hang Analysis
//!
//! hangdump collects diagnostic records while a driver context encodes GPU
//! work and renders them only when someone asks: after a hang, on a VM
//! fault, or when an auxiliary context flushes. Recording is cheap (shared
//! handles and watermarks); the expensive work (linearizing command streams,
//! disassembling shaders, auditing descriptors) happens at dump time.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Driver context (DebugContext)                  │
//! │   command streams · bound shaders · descriptor tables · trace   │
//! └───────────┬──────────────────────────────┬──────────────────────┘
//!             │ log_draw_state / log_cs      │ flush_hw
//!             ▼                              ▼
//! ┌───────────────────────┐      ┌───────────────────────┐
//! │     DeferredLog       │      │  SavedCommandStream   │
//! │ shader · IB · desc.   │◀─────│  linear IB + buffers  │
//! └───────────┬───────────┘      └───────────────────────┘
//!             │ flush (hang / aux dump / fault report)
//!             ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Report Sink                            │
//! │  IB markers · residency map · descriptor audit · annotated asm  │
//! └─────────────────────────────────────────────────────────────────┘
//!             ▲
//!             │ on fault
//! ┌───────────┴───────────┐      ┌───────────────────────┐
//! │  FaultOrchestrator    │◀─────│  FaultMonitor (dmesg) │
//! └───────────────────────┘      └───────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Recording
//!
//! - [`chunk_log`]: the deferred log and the closed set of records it holds
//! - [`command_stream`]: segmented streams, delta capture and saved IBs
//! - [`shader`]: shader programs, disassembly extraction, replacement override
//! - [`descriptors`]: descriptor tables and the CPU/GPU corruption audit
//! - [`context`]: the per-driver-context facade tying the recorders together
//!
//! ### Analysis and Reporting
//!
//! - [`residency`]: buffer-list map with holes and usage labels
//! - [`correlate`]: instruction splitting and wave-to-instruction annotation
//! - [`system_dump`]: output of external wave-dump tools
//! - [`fault`]: kernel-log fault detection and the fault report
//! - [`report`]: the text sink, colours and section markers
//!
//! ### Support
//!
//! - [`device`]: device-side collaborators (buffers, waves, registers)
//! - [`domain`]: stage and stream names, structured errors
//! - [`capture_file`]: replaying a captured driver context from JSON
//! - [`cli`]: command-line arguments
//!
//! ## Typical Usage
//!
//! ```bash
//! # Render the deferred log of a captured context
//! hangdump capture.json
//!
//! # Full hang report with registers and annotated shaders
//! hangdump capture.json --device-status --output hang.txt
//!
//! # Replay the post-submission VM fault check
//! hangdump capture.json --watch-faults --dump-dir /tmp/dumps
//! ```

pub mod capture_file;
pub mod chunk_log;
pub mod cli;
pub mod command_stream;
pub mod context;
pub mod correlate;
pub mod descriptors;
pub mod device;
pub mod domain;
pub mod fault;
pub mod report;
pub mod residency;
pub mod shader;
pub mod system_dump;

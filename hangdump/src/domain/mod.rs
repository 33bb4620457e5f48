//! Domain model for hangdump
//!
//! This module contains core domain types and errors that provide:
//! - Named shader stages and command-stream kinds instead of bare indices
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{FaultRing, ShaderStage, StreamKind};

pub use errors::{CaptureError, CaptureFileError, ReplaceShaderError, ReportError};

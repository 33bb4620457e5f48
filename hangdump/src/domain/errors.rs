//! Structured error types for hangdump
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use thiserror::Error;

/// Resource exhaustion while copying live state into a capture
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Out of memory linearizing {words} command stream dwords")]
    OutOfMemory { words: usize },

    #[error("Out of memory copying {count} buffer list entries")]
    BufferListOutOfMemory { count: usize },

    #[error("Out of memory copying {words} descriptor dwords for {list}")]
    DescriptorListOutOfMemory { list: String, words: usize },
}

/// Problems with the shader replacement override
#[derive(Error, Debug)]
pub enum ReplaceShaderError {
    /// Fatal: the override string does not follow `index:path[;index:path]`
    #[error("{variable} formatted badly: {detail}")]
    Malformed { variable: &'static str, detail: String },

    #[error("Failed to read replacement shader {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplaceShaderError {
    /// Whether the error must terminate the process
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReplaceShaderError::Malformed { .. })
    }
}

/// Failures writing a report
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to open report file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Problems loading a replayed device-state capture
#[derive(Error, Debug)]
pub enum CaptureFileError {
    #[error("Invalid capture data: {0}")]
    InvalidCapture(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

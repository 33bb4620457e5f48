//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Programmable pipeline stage a shader or descriptor set belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    TessCtrl,
    TessEval,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Graphics stages in pipeline order
    pub const GRAPHICS: [ShaderStage; 5] = [
        ShaderStage::Vertex,
        ShaderStage::TessCtrl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    /// Every stage, graphics first
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessCtrl,
        ShaderStage::TessEval,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// Short name used as the prefix of descriptor slot headings
    #[must_use]
    pub fn short_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "VS",
            ShaderStage::TessCtrl => "TCS",
            ShaderStage::TessEval => "TES",
            ShaderStage::Geometry => "GS",
            ShaderStage::Fragment => "PS",
            ShaderStage::Compute => "CS",
        }
    }

    /// Dense index, usable for per-stage arrays
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Tracked command stream of a driver context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Gfx,
    Compute,
}

impl StreamKind {
    /// Label used in the IB begin/end markers
    #[must_use]
    pub fn ib_name(self) -> &'static str {
        match self {
            StreamKind::Gfx => "IB",
            StreamKind::Compute => "Compute IB",
        }
    }
}

/// Ring a VM fault check was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultRing {
    #[default]
    Gfx,
    Dma,
    Other,
}

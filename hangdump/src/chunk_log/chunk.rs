//! The closed set of log records

use std::io;

use crate::command_stream::CommandStreamChunk;
use crate::descriptors::DescriptorListChunk;
use crate::report::Sink;
use crate::shader::ShaderChunk;

/// Capabilities every deferred record provides
pub trait LogChunk {
    /// Format the record into `sink`
    ///
    /// Data that cannot be read any more (unmapped buffers, busy streams)
    /// must be rendered as a partial record, not reported as an error.
    ///
    /// # Errors
    /// Returns an error only if the sink itself fails
    fn render(&self, sink: &mut Sink<'_>) -> io::Result<()>;

    /// Drop the references the record holds
    fn release(self)
    where
        Self: Sized,
    {
    }
}

/// One entry of a [`DeferredLog`](super::DeferredLog)
pub enum ChunkRecord {
    Shader(ShaderChunk),
    CommandStream(CommandStreamChunk),
    DescriptorList(DescriptorListChunk),
}

impl ChunkRecord {
    /// Short label for log messages
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChunkRecord::Shader(_) => "shader",
            ChunkRecord::CommandStream(_) => "command stream",
            ChunkRecord::DescriptorList(_) => "descriptor list",
        }
    }
}

impl LogChunk for ChunkRecord {
    fn render(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        match self {
            ChunkRecord::Shader(chunk) => chunk.render(sink),
            ChunkRecord::CommandStream(chunk) => chunk.render(sink),
            ChunkRecord::DescriptorList(chunk) => chunk.render(sink),
        }
    }

    fn release(self) {
        match self {
            ChunkRecord::Shader(chunk) => chunk.release(),
            ChunkRecord::CommandStream(chunk) => chunk.release(),
            ChunkRecord::DescriptorList(chunk) => chunk.release(),
        }
    }
}

impl From<ShaderChunk> for ChunkRecord {
    fn from(chunk: ShaderChunk) -> Self {
        ChunkRecord::Shader(chunk)
    }
}

impl From<CommandStreamChunk> for ChunkRecord {
    fn from(chunk: CommandStreamChunk) -> Self {
        ChunkRecord::CommandStream(chunk)
    }
}

impl From<DescriptorListChunk> for ChunkRecord {
    fn from(chunk: DescriptorListChunk) -> Self {
        ChunkRecord::DescriptorList(chunk)
    }
}

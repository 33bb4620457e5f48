//! Linked shader programs and their log record

use log::debug;
use std::io::{self, Write};
use std::rc::Rc;

use super::binary::ShaderBinary;
use crate::chunk_log::LogChunk;
use crate::device::GpuBuffer;
use crate::domain::ShaderStage;
use crate::report::{Sink, Tone};

/// A shader as uploaded for execution: its parts and the code buffer
///
/// The parts are laid out back to back in `code`, in link order: prolog,
/// merged previous stage, second prolog, main body, epilog.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    pub name: String,
    pub stage: ShaderStage,
    pub code: GpuBuffer,
    pub prolog: Option<ShaderBinary>,
    pub previous_stage: Option<ShaderBinary>,
    pub prolog2: Option<ShaderBinary>,
    pub main: ShaderBinary,
    pub epilog: Option<ShaderBinary>,
    /// Precomputed compiler log, printed instead of the disassembly
    pub shader_log: Option<String>,
}

impl ShaderProgram {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        stage: ShaderStage,
        code: GpuBuffer,
        main: ShaderBinary,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            code,
            prolog: None,
            previous_stage: None,
            prolog2: None,
            main,
            epilog: None,
            shader_log: None,
        }
    }

    #[must_use]
    pub fn with_prolog(mut self, prolog: ShaderBinary) -> Self {
        self.prolog = Some(prolog);
        self
    }

    #[must_use]
    pub fn with_previous_stage(mut self, previous: ShaderBinary) -> Self {
        self.previous_stage = Some(previous);
        self
    }

    #[must_use]
    pub fn with_prolog2(mut self, prolog2: ShaderBinary) -> Self {
        self.prolog2 = Some(prolog2);
        self
    }

    #[must_use]
    pub fn with_epilog(mut self, epilog: ShaderBinary) -> Self {
        self.epilog = Some(epilog);
        self
    }

    #[must_use]
    pub fn with_shader_log(mut self, log: impl Into<String>) -> Self {
        self.shader_log = Some(log.into());
        self
    }

    /// Parts in link order
    pub fn parts(&self) -> impl Iterator<Item = &ShaderBinary> {
        [
            self.prolog.as_ref(),
            self.previous_stage.as_ref(),
            self.prolog2.as_ref(),
            Some(&self.main),
            self.epilog.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Write the shader log, or the disassembly of every part
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn dump(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        if let Some(log) = &self.shader_log {
            return sink.write_all(log.as_bytes());
        }

        sink.painted_line(Tone::Heading, format!("{} ({}) disassembly:", self.name, self.stage))?;
        for part in self.parts() {
            match part.disassembly() {
                Some(text) => {
                    sink.write_all(text.as_bytes())?;
                    if !text.ends_with('\n') {
                        writeln!(sink)?;
                    }
                }
                None => writeln!(sink, "(disassembly unavailable)")?,
            }
        }
        writeln!(sink)
    }

    /// Write the code buffer as raw words
    ///
    /// # Errors
    /// Returns an error if the sink fails
    pub fn dump_code(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        writeln!(sink, "BO: VA={:x} Size={}", self.code.gpu_address(), self.code.size())?;

        // Unsynchronized read; the GPU may still be executing this code
        match self.code.map() {
            Some(words) => {
                for (i, word) in words.iter().enumerate() {
                    writeln!(sink, " {:4x}: {word:08x}", i * 4)?;
                }
            }
            None => {
                debug!("Shader {} code buffer is not mappable", self.name);
                writeln!(sink, "(shader BO not mappable)")?;
            }
        }
        writeln!(sink)
    }
}

/// Log record of a bound shader; keeps the program alive until flushed
pub struct ShaderChunk {
    shader: Rc<ShaderProgram>,
    dump_binary: bool,
}

impl ShaderChunk {
    #[must_use]
    pub fn new(shader: Rc<ShaderProgram>, dump_binary: bool) -> Self {
        Self { shader, dump_binary }
    }

    #[must_use]
    pub fn shader(&self) -> &ShaderProgram {
        &self.shader
    }
}

impl LogChunk for ShaderChunk {
    fn render(&self, sink: &mut Sink<'_>) -> io::Result<()> {
        self.shader.dump(sink)?;
        if self.dump_binary {
            self.shader.dump_code(sink)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> ShaderProgram {
        ShaderProgram::new(
            "ps_main",
            ShaderStage::Fragment,
            GpuBuffer::mapped(0x1_0000, vec![0xbf80_0000, 0xbf81_0000]),
            ShaderBinary::from_disassembly("s_nop 0 ; BF800000\ns_endpgm ; BF810000\n"),
        )
    }

    fn render(chunk: &ShaderChunk) -> String {
        let mut out = Vec::new();
        chunk.render(&mut Sink::plain(&mut out)).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parts_follow_link_order() {
        let program = program()
            .with_epilog(ShaderBinary::from_disassembly("epilog"))
            .with_prolog(ShaderBinary::from_disassembly("prolog"));
        let texts: Vec<String> =
            program.parts().filter_map(|p| p.disassembly()).map(|t| t.into_owned()).collect();
        assert_eq!(texts[0], "prolog");
        assert_eq!(texts[2], "epilog");
    }

    #[test]
    fn test_shader_log_printed_verbatim() {
        let chunk = ShaderChunk::new(Rc::new(program().with_shader_log("compiler log\n")), false);
        assert_eq!(render(&chunk), "compiler log\n");
    }

    #[test]
    fn test_binary_hexdump() {
        let text = render(&ShaderChunk::new(Rc::new(program()), true));
        assert!(text.contains("ps_main (PS) disassembly:"));
        assert!(text.contains("BO: VA=10000 Size=8\n"));
        assert!(text.contains("    0: bf800000\n    4: bf810000\n"));
    }

    #[test]
    fn test_unmappable_code_is_noted() {
        let mut shader = program();
        shader.code = GpuBuffer::unmappable(0x2000, 64);
        let text = render(&ShaderChunk::new(Rc::new(shader), true));
        assert!(text.contains("(shader BO not mappable)"));
    }
}

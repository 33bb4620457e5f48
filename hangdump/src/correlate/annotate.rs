//! Wave-to-instruction correlation
//!
//! For every bound shader that some wave is executing, print its disassembly
//! and mark the instructions the waves are sitting on. Waves arrive sorted by
//! program counter and instructions are in address order, so one forward walk
//! over both lists pairs them up.

use std::borrow::Cow;
use std::io::{self, Write};

use hangdump_common::WaveInfo;

use super::split::{split_instructions_with_sizes, Instruction};
use crate::report::{Sink, Tone};
use crate::shader::ShaderProgram;

/// A wave and whether it was attributed to a bound shader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveState {
    pub info: WaveInfo,
    pub matched: bool,
}

impl From<WaveInfo> for WaveState {
    fn from(info: WaveInfo) -> Self {
        Self { info, matched: false }
    }
}

/// Disassembly of one linked part, with its optional size table
#[derive(Debug, Clone, Copy)]
pub struct CodeSegment<'a> {
    pub disassembly: &'a str,
    pub sizes: Option<&'a [u32]>,
}

/// An instruction and the waves currently executing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedInstruction<'a> {
    pub instruction: Instruction<'a>,
    pub waves: Vec<WaveInfo>,
}

/// Pair the instructions of a shader with the waves executing them
///
/// `base` and `size` describe the code buffer; the segments are laid out
/// back to back from `base`. Returns `None` when no wave's PC lies in
/// `[base, base + size)`. Every wave attached to an instruction is marked
/// matched; waves whose PC falls between instruction addresses are skipped.
pub fn annotate<'a>(
    base: u64,
    size: u64,
    segments: &[CodeSegment<'a>],
    waves: &mut [WaveState],
) -> Option<Vec<AnnotatedInstruction<'a>>> {
    debug_assert!(
        waves.windows(2).all(|pair| pair[0].info.pc <= pair[1].info.pc),
        "waves must be sorted by PC"
    );

    let end = base.saturating_add(size);
    let mut next = waves.iter().position(|w| (base..end).contains(&w.info.pc))?;

    let mut address = base;
    let mut annotated = Vec::new();
    for segment in segments {
        let instructions =
            split_instructions_with_sizes(segment.disassembly, address, segment.sizes);
        if let Some(last) = instructions.last() {
            address = last.address + u64::from(last.size);
        }

        for instruction in instructions {
            while next < waves.len() && waves[next].info.pc < instruction.address {
                next += 1;
            }

            let mut executing = Vec::new();
            while next < waves.len() && waves[next].info.pc == instruction.address {
                waves[next].matched = true;
                executing.push(waves[next].info);
                next += 1;
            }
            annotated.push(AnnotatedInstruction { instruction, waves: executing });
        }
    }

    Some(annotated)
}

/// Write an annotated disassembly
///
/// # Errors
/// Returns an error if the sink fails
pub fn render_annotated(
    name: &str,
    annotated: &[AnnotatedInstruction<'_>],
    sink: &mut Sink<'_>,
) -> io::Result<()> {
    sink.painted_line(Tone::Heading, format!("{name} - annotated disassembly:"))?;

    for AnnotatedInstruction { instruction, waves } in annotated {
        writeln!(
            sink,
            "{} [PC=0x{:x}, size={}]",
            instruction.text.trim_end_matches('\n'),
            instruction.address,
            instruction.size
        )?;

        for wave in waves {
            let inst = if instruction.size == 4 {
                format!("INST32={:08X}", wave.inst_dw0)
            } else {
                format!("INST64={:08X} {:08X}", wave.inst_dw0, wave.inst_dw1)
            };
            let line = format!(
                "^ SE{} SH{} CU{} SIMD{} WAVE{}  EXEC={:016x}  {inst}",
                wave.se, wave.sh, wave.cu, wave.simd, wave.wave, wave.exec
            );
            write!(sink, "          ")?;
            sink.painted_line(Tone::Good, line)?;
        }
    }

    write!(sink, "\n\n")
}

/// Correlate the live waves with every shader in `shaders`
///
/// Prints the wave count, the annotated disassembly of each shader some wave
/// executes, then the waves no shader claimed.
///
/// # Errors
/// Returns an error if the sink fails
pub fn dump_annotated_shaders<'s>(
    shaders: impl IntoIterator<Item = &'s ShaderProgram>,
    waves: Vec<WaveInfo>,
    sink: &mut Sink<'_>,
) -> io::Result<()> {
    let mut waves: Vec<WaveState> = waves.into_iter().map(WaveState::from).collect();
    waves.sort_by_key(|w| w.info.pc);

    sink.painted_line(Tone::Accent, format!("The number of active waves = {}", waves.len()))?;
    writeln!(sink)?;

    for shader in shaders {
        let texts: Vec<(Cow<'_, str>, Option<&[u32]>)> = shader
            .parts()
            .filter_map(|part| Some((part.disassembly()?, part.instruction_sizes.as_deref())))
            .collect();
        let segments: Vec<CodeSegment<'_>> = texts
            .iter()
            .map(|(text, sizes)| CodeSegment { disassembly: text, sizes: *sizes })
            .collect();

        let (base, size) = (shader.code.gpu_address(), shader.code.size());
        if let Some(annotated) = annotate(base, size, &segments, &mut waves) {
            render_annotated(&shader.name, &annotated, sink)?;
        }
    }

    let mut unmatched = waves.iter().filter(|w| !w.matched).peekable();
    if unmatched.peek().is_some() {
        sink.painted_line(Tone::Accent, "Waves not executing currently-bound shaders:")?;
        for WaveState { info: w, .. } in unmatched {
            writeln!(
                sink,
                "    SE{} SH{} CU{} SIMD{} WAVE{}  EXEC={:016x}  INST={:08X} {:08X}  PC={:x}",
                w.se, w.sh, w.cu, w.simd, w.wave, w.exec, w.inst_dw0, w.inst_dw1, w.pc
            )?;
        }
        write!(sink, "\n\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::GpuBuffer;
    use crate::domain::ShaderStage;
    use crate::shader::ShaderBinary;

    const A: u64 = 0x4000;
    const BODY: &str = "s_nop 0 ; BF800000\ns_nop 1 ; BF800001\ns_endpgm ; BF810000\n";

    fn wave(pc: u64, simd: u32) -> WaveState {
        WaveInfo { pc, simd, inst_dw0: 0xbf80_0000, ..WaveInfo::default() }.into()
    }

    fn segment(text: &str) -> CodeSegment<'_> {
        CodeSegment { disassembly: text, sizes: None }
    }

    #[test]
    fn test_annotation_is_deterministic() {
        let mut waves = [wave(A, 0), wave(A, 1), wave(A + 8, 2)];
        let annotated = annotate(A, 12, &[segment(BODY)], &mut waves).unwrap();

        let per_instruction: Vec<Vec<u32>> =
            annotated.iter().map(|a| a.waves.iter().map(|w| w.simd).collect()).collect();
        assert_eq!(per_instruction, [vec![0, 1], vec![], vec![2]]);
        assert!(waves.iter().all(|w| w.matched));
    }

    #[test]
    fn test_no_wave_in_range_returns_none() {
        let mut waves = [wave(A - 4, 0), wave(A + 12, 1)];
        assert!(annotate(A, 12, &[segment(BODY)], &mut waves).is_none());
        assert!(waves.iter().all(|w| !w.matched));
    }

    #[test]
    fn test_misaligned_wave_is_skipped_not_blocking() {
        let mut waves = [wave(A + 2, 0), wave(A + 4, 1)];
        let annotated = annotate(A, 12, &[segment(BODY)], &mut waves).unwrap();

        assert!(!waves[0].matched);
        assert!(waves[1].matched);
        assert_eq!(annotated[1].waves.len(), 1);
    }

    #[test]
    fn test_segments_are_contiguous() {
        let prolog = "s_mov_b32 s0, s1 ; BE800001\n";
        let mut waves = [wave(A + 4, 0)];
        let annotated = annotate(A, 16, &[segment(prolog), segment(BODY)], &mut waves).unwrap();

        assert_eq!(annotated.len(), 4);
        assert_eq!(annotated[1].instruction.address, A + 4);
        assert_eq!(annotated[1].waves.len(), 1);
    }

    #[test]
    fn test_dump_lists_unmatched_waves() {
        let shader = ShaderProgram::new(
            "vs_main",
            ShaderStage::Vertex,
            GpuBuffer::unmappable(A, 12),
            ShaderBinary::from_disassembly(BODY),
        );
        let waves = vec![wave(0x9000, 3).info, wave(A + 4, 1).info];

        let mut out = Vec::new();
        dump_annotated_shaders([&shader], waves, &mut Sink::plain(&mut out)).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("The number of active waves = 2\n\n"));
        assert!(text.contains("vs_main - annotated disassembly:"));
        assert!(text.contains("s_nop 1 ; BF800001 [PC=0x4004, size=4]\n"));
        let marker = "          ^ SE0 SH0 CU0 SIMD1 WAVE0  EXEC=0000000000000000  INST32=BF800000";
        assert!(text.contains(marker));
        assert!(text.contains("Waves not executing currently-bound shaders:\n"));
        assert!(text.contains("SIMD3 WAVE0") && text.contains("PC=9000"));
    }

    #[test]
    fn test_dump_without_waves_only_prints_count() {
        let mut out = Vec::new();
        dump_annotated_shaders(std::iter::empty(), Vec::new(), &mut Sink::plain(&mut out)).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "The number of active waves = 0\n\n");
    }
}

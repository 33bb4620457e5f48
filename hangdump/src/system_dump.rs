//! Output of external system-inspection tools
//!
//! Some state (halted wave dumps in particular) is only reachable through
//! external utilities such as `umr`. Their stdout is copied into the report
//! under a heading; a tool that is missing or fails to start simply leaves
//! its section out.

use log::debug;
use std::io::{self, Write};
use std::process::Command;

use crate::report::{Sink, Tone};

/// An external command whose output belongs in a debug-state dump
#[derive(Debug, Clone, Copy)]
pub struct SystemDump {
    pub title: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
}

/// Wave dumps taken after halting the waves
pub const WAVE_DUMPS: &[SystemDump] = &[
    SystemDump {
        title: "Active waves (raw data)",
        program: "umr",
        args: &["-O", "halt_waves", "-wa"],
    },
    SystemDump {
        title: "Wave information",
        program: "umr",
        args: &["-O", "halt_waves,bits", "-wa"],
    },
];

/// Run `program` and copy its stdout under `title`
///
/// Returns whether the section was written.
///
/// # Errors
/// Returns an error if the sink fails; a failing command is not an error
pub fn dump_command(
    title: &str,
    program: &str,
    args: &[&str],
    sink: &mut Sink<'_>,
) -> io::Result<bool> {
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(e) => {
            debug!("Skipping {title}: failed to run {program}: {e}");
            return Ok(false);
        }
    };
    if !output.status.success() {
        debug!("{program} exited with {}", output.status);
    }

    sink.painted_line(Tone::Heading, format!("{title}: "))?;
    sink.write_all(&output.stdout)?;
    write!(sink, "\n\n")?;
    Ok(true)
}

/// Run every dump in `dumps`, in order
///
/// # Errors
/// Returns an error if the sink fails
pub fn dump_all(dumps: &[SystemDump], sink: &mut Sink<'_>) -> io::Result<()> {
    for dump in dumps {
        dump_command(dump.title, dump.program, dump.args, sink)?;
    }
    Ok(())
}

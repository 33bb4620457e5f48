//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

use crate::report::ColorChoice;
use crate::shader::REPLACE_SHADERS_VAR;

#[derive(Parser, Debug)]
#[command(
    name = "hangdump",
    about = "Render GPU hang and VM fault reports from a captured driver context",
    after_help = "\
EXAMPLES:
    hangdump capture.json                         Dump the deferred log
    hangdump capture.json --device-status         Add registers and annotated shaders
    hangdump capture.json --watch-faults          Replay the fault check after submission
    HANGDUMP_REPLACE_SHADERS='3:fixed.elf' hangdump capture.json"
)]
pub struct Args {
    /// Device-state capture (JSON)
    #[arg(value_name = "CAPTURE")]
    pub capture: PathBuf,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Colour the report
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    /// Include status registers and wave-annotated shaders
    #[arg(long)]
    pub device_status: bool,

    /// Also run the external wave-dump tools (requires --device-status)
    #[arg(long, requires = "device_status")]
    pub system_dumps: bool,

    /// Check for VM faults after the IB is submitted
    #[arg(long)]
    pub watch_faults: bool,

    /// Read faults from the kernel log instead of the capture
    #[arg(long, requires = "watch_faults")]
    pub dmesg: bool,

    /// Number of fault checks to perform
    #[arg(long, default_value = "1", requires = "watch_faults")]
    pub polls: usize,

    /// Directory receiving VM fault and aux context reports
    #[arg(long, value_name = "DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Write the log to a numbered file in the dump directory at flush time
    #[arg(long)]
    pub aux_dump: bool,

    /// Append a hexdump of each shader's code buffer
    #[arg(long)]
    pub dump_shader_binary: bool,

    /// Shader overrides, `index:path[;index:path...]`
    #[arg(long, env = REPLACE_SHADERS_VAR, value_name = "LIST")]
    pub replace_shaders: Option<String>,
}

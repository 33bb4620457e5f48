//! Report sink
//!
//! Every diagnostic record renders into a [`Sink`]: an append-only text
//! stream with optional ANSI colours. Reports are read with `less -R`; when
//! colours are off the same text is produced without escape sequences.
//!
//! Sections that carry command-stream data are framed by begin/end markers
//! which [`parse_marker`] recognises, so tooling can cut a report apart:
//!
//! ```text
//! ------------------ IB begin (dw = 0) ------------------
//!        0: c0012800
//! ------------------- IB end (dw = 1) -------------------
//! ```

use crossterm::style::{style, Color, Stylize};
use std::fmt::Display;
use std::io::{self, Write};

/// When to emit ANSI colour sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Colour when writing to a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    /// Resolve to an on/off decision for a given output
    #[must_use]
    pub fn enabled(self, output_is_terminal: bool) -> bool {
        match self {
            ColorChoice::Auto => output_is_terminal,
            ColorChoice::Always => true,
            ColorChoice::Never => false,
        }
    }
}

/// Semantic colour of a piece of report text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Section headings (bold yellow)
    Heading,
    /// Slot headings and executing-wave markers (bold green)
    Good,
    /// Sub-record headings and wave counts (bold cyan)
    Accent,
    /// Corruption warnings (red)
    Alert,
}

impl Tone {
    fn color(self) -> Color {
        match self {
            Tone::Heading => Color::Yellow,
            Tone::Good => Color::Green,
            Tone::Accent => Color::Cyan,
            Tone::Alert => Color::Red,
        }
    }
}

/// Append-only text output for diagnostic reports
pub struct Sink<'a> {
    out: &'a mut dyn Write,
    colored: bool,
}

impl<'a> Sink<'a> {
    pub fn new(out: &'a mut dyn Write, colored: bool) -> Self {
        Self { out, colored }
    }

    /// Sink that never emits escape sequences
    pub fn plain(out: &'a mut dyn Write) -> Self {
        Self::new(out, false)
    }

    #[must_use]
    pub fn is_colored(&self) -> bool {
        self.colored
    }

    /// Format `text` in the given tone without writing it
    pub fn painted(&self, tone: Tone, text: impl Display) -> String {
        if !self.colored {
            return text.to_string();
        }
        let styled = style(text).with(tone.color());
        match tone {
            Tone::Alert => styled.to_string(),
            _ => styled.bold().to_string(),
        }
    }

    /// Write `text` in the given tone
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn paint(&mut self, tone: Tone, text: impl Display) -> io::Result<()> {
        let painted = self.painted(tone, text);
        self.out.write_all(painted.as_bytes())
    }

    /// Write `text` in the given tone followed by a line break
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn painted_line(&mut self, tone: Tone, text: impl Display) -> io::Result<()> {
        self.paint(tone, text)?;
        self.out.write_all(b"\n")
    }

    /// Write the marker opening a command-stream section
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn begin_marker(&mut self, name: &str, dw: usize) -> io::Result<()> {
        writeln!(self.out, "------------------ {name} begin (dw = {dw}) ------------------")
    }

    /// Write the marker closing a command-stream section
    ///
    /// # Errors
    /// Returns an error if the underlying writer fails
    pub fn end_marker(&mut self, name: &str, dw: usize) -> io::Result<()> {
        writeln!(self.out, "------------------- {name} end (dw = {dw}) -------------------\n")
    }
}

impl Write for Sink<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.out.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// A begin or end marker found in a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub name: String,
    pub begin: bool,
    pub dw: usize,
}

/// Recognise a section marker written by [`Sink::begin_marker`] or
/// [`Sink::end_marker`]
#[must_use]
pub fn parse_marker(line: &str) -> Option<Marker> {
    let inner = line.trim().trim_matches('-').trim();
    let (head, dw) = inner.strip_suffix(')')?.rsplit_once("(dw = ")?;
    let dw = dw.trim().parse().ok()?;
    let head = head.trim_end();

    if let Some(name) = head.strip_suffix(" begin") {
        Some(Marker { name: name.to_string(), begin: true, dw })
    } else {
        head.strip_suffix(" end").map(|name| Marker { name: name.to_string(), begin: false, dw })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sink_has_no_escapes() {
        let mut out = Vec::new();
        let mut sink = Sink::plain(&mut out);
        sink.painted_line(Tone::Alert, "corrupted").unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "corrupted\n");
    }

    #[test]
    fn test_colored_sink_wraps_text() {
        let mut out = Vec::new();
        let mut sink = Sink::new(&mut out, true);
        let painted = sink.painted(Tone::Heading, "Buffer list");
        sink.paint(Tone::Heading, "Buffer list").unwrap();

        assert!(painted.contains("Buffer list"));
        assert_eq!(String::from_utf8(out).unwrap(), painted);
    }

    #[test]
    fn test_markers_round_trip_through_parser() {
        let mut out = Vec::new();
        let mut sink = Sink::plain(&mut out);
        sink.begin_marker("Compute IB", 12).unwrap();
        sink.end_marker("Compute IB", 40).unwrap();

        let text = String::from_utf8(out).unwrap();
        let markers: Vec<_> = text.lines().filter_map(parse_marker).collect();
        assert_eq!(
            markers,
            vec![
                Marker { name: "Compute IB".to_string(), begin: true, dw: 12 },
                Marker { name: "Compute IB".to_string(), begin: false, dw: 40 },
            ]
        );
    }

    #[test]
    fn test_parse_marker_rejects_other_lines() {
        assert_eq!(parse_marker("Buffer list (in units of pages = 4kB):"), None);
        assert_eq!(parse_marker("---------- Next IB Chunk ----------"), None);
    }

    #[test]
    fn test_color_choice_resolution() {
        assert!(ColorChoice::Always.enabled(false));
        assert!(!ColorChoice::Never.enabled(true));
        assert!(ColorChoice::Auto.enabled(true));
        assert!(!ColorChoice::Auto.enabled(false));
    }
}

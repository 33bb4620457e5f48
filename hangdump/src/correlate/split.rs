//! Splitting disassembly text into addressed instructions
//!
//! The disassembler emits one instruction per line with its encoding after a
//! `;`:
//!
//! ```text
//! BB0_1:
//!   s_load_dwordx4 s[0:3], s[4:5], 0x0    ; C00A0002 00000000
//!   s_waitcnt lgkmcnt(0)                  ; BF8CC07F
//! ```
//!
//! Everything up to and including the line break after a `;` belongs to one
//! instruction, so labels fold into the instruction that follows them.

/// One instruction of a disassembly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction<'a> {
    /// Source text, including the trailing line break when present
    pub text: &'a str,
    pub address: u64,
    /// Encoded size in bytes, 4 or 8
    pub size: u32,
}

/// Encodings after the `;` longer than this are two dwords
const SINGLE_DWORD_ENCODING_WIDTH: usize = 16;

/// Split `text`, sizing instructions from the width of their encodings
#[must_use]
pub fn split_instructions(text: &str, load_address: u64) -> Vec<Instruction<'_>> {
    split_instructions_with_sizes(text, load_address, None)
}

/// Split `text`, taking sizes from `sizes` where it has an entry
///
/// Instructions past the end of the table fall back to the width heuristic.
#[must_use]
pub fn split_instructions_with_sizes<'a>(
    text: &'a str,
    load_address: u64,
    sizes: Option<&[u32]>,
) -> Vec<Instruction<'a>> {
    let mut instructions = Vec::new();
    let mut address = load_address;
    let mut start = 0;

    while let Some(offset) = text[start..].find(';') {
        let semicolon = start + offset;
        let line_end = text[semicolon + 1..].find('\n').map(|i| semicolon + 1 + i);
        // The encoding stops at the line break, the instruction text includes it
        let (encoding_end, end) = match line_end {
            Some(i) => (i, i + 1),
            None => (text.len(), text.len()),
        };

        let size = sizes.and_then(|table| table.get(instructions.len()).copied()).unwrap_or(
            if encoding_end - semicolon > SINGLE_DWORD_ENCODING_WIDTH { 8 } else { 4 },
        );

        instructions.push(Instruction { text: &text[start..end], address, size });
        address += u64::from(size);
        start = end;
        if start >= text.len() {
            break;
        }
    }

    instructions
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
BB0_1:
  s_load_dwordx4 s[0:3], s[4:5], 0x0    ; C00A0002 00000000
  s_waitcnt lgkmcnt(0)                  ; BF8CC07F
  s_endpgm                              ; BF810000
";

    #[test]
    fn test_split_covers_input_without_gaps() {
        let instructions = split_instructions(LISTING, 0x1000);
        let rejoined: String = instructions.iter().map(|i| i.text).collect();
        assert_eq!(rejoined, LISTING);

        for pair in instructions.windows(2) {
            assert_eq!(pair[1].address, pair[0].address + u64::from(pair[0].size));
        }
    }

    #[test]
    fn test_labels_fold_into_next_instruction() {
        let instructions = split_instructions(LISTING, 0);
        assert_eq!(instructions.len(), 3);
        assert!(instructions[0].text.starts_with("BB0_1:\n"));
    }

    #[test]
    fn test_width_heuristic() {
        let sizes: Vec<u32> = split_instructions(LISTING, 0).iter().map(|i| i.size).collect();
        assert_eq!(sizes, [8, 4, 4]);
    }

    #[test]
    fn test_explicit_sizes_win() {
        let instructions = split_instructions_with_sizes(LISTING, 0x100, Some(&[4, 8]));
        let layout: Vec<(u64, u32)> = instructions.iter().map(|i| (i.address, i.size)).collect();
        assert_eq!(layout, [(0x100, 4), (0x104, 8), (0x10c, 4)]);
    }

    #[test]
    fn test_last_line_without_break() {
        let instructions = split_instructions("s_nop 0 ; BF800000\ns_endpgm ; BF810000", 0);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].text, "s_endpgm ; BF810000");
    }

    #[test]
    fn test_trailing_text_without_terminator_is_dropped() {
        let instructions = split_instructions("s_nop 0 ; BF800000\n; comment\nlabel:\n", 0);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[1].text, "; comment\n");
    }
}

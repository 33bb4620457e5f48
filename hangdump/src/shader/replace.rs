//! Shader replacement override
//!
//! Any shader can be swapped for an arbitrary ELF object while debugging:
//!
//! ```text
//! HANGDUMP_REPLACE_SHADERS="3:/tmp/fixed.elf;0x10:/tmp/other.elf"
//! ```
//!
//! Indices are numbered in the order shaders are created and accept decimal,
//! `0x` hexadecimal and leading-zero octal.

use log::{info, warn};
use std::path::{Path, PathBuf};

use crate::domain::ReplaceShaderError;

/// Environment variable holding the override list
pub const REPLACE_SHADERS_VAR: &str = "HANGDUMP_REPLACE_SHADERS";

/// One `index:path` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub index: u64,
    pub path: PathBuf,
}

/// Parse an override list
///
/// Empty entries (such as a trailing `;`) are ignored.
///
/// # Errors
/// Returns [`ReplaceShaderError::Malformed`] for an entry without `:` or
/// with an unparsable index
pub fn parse_replacements(list: &str) -> Result<Vec<Replacement>, ReplaceShaderError> {
    list.split(';')
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (index, path) = entry.split_once(':').ok_or_else(|| malformed(entry))?;
            let index = parse_index(index.trim()).ok_or_else(|| malformed(entry))?;
            Ok(Replacement { index, path: PathBuf::from(path) })
        })
        .collect()
}

fn malformed(entry: &str) -> ReplaceShaderError {
    ReplaceShaderError::Malformed {
        variable: REPLACE_SHADERS_VAR,
        detail: format!("expected index:path, got {entry:?}"),
    }
}

fn parse_index(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// Look up shader `index` in the override list and load its replacement
///
/// Returns `Ok(None)` when there is no list or it does not name `index`.
///
/// # Errors
/// [`ReplaceShaderError::Malformed`] for a bad list (fatal for the caller),
/// [`ReplaceShaderError::Unreadable`] when the named file cannot be read
pub fn replace_shader(
    list: Option<&str>,
    index: u64,
) -> Result<Option<Vec<u8>>, ReplaceShaderError> {
    let Some(list) = list else {
        return Ok(None);
    };
    let Some(entry) = parse_replacements(list)?.into_iter().find(|r| r.index == index) else {
        return Ok(None);
    };

    info!("Replacing shader {index} by {}", entry.path.display());
    read_replacement(&entry.path).map(Some)
}

fn read_replacement(path: &Path) -> Result<Vec<u8>, ReplaceShaderError> {
    std::fs::read(path).map_err(|source| {
        warn!("Failed to read replacement shader {}: {source}", path.display());
        ReplaceShaderError::Unreadable { path: path.to_path_buf(), source }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_index_bases() {
        let list = parse_replacements("10:a;0x10:b;010:c;0:d;").unwrap();
        let indices: Vec<u64> = list.iter().map(|r| r.index).collect();
        assert_eq!(indices, [10, 16, 8, 0]);
        assert_eq!(list[1].path, PathBuf::from("b"));
    }

    #[test]
    fn test_missing_colon_is_fatal() {
        let err = parse_replacements("3=/tmp/x").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().starts_with("HANGDUMP_REPLACE_SHADERS formatted badly"));
    }

    #[test]
    fn test_bad_index_is_fatal() {
        assert!(parse_replacements("zz:/tmp/x").unwrap_err().is_fatal());
        assert!(parse_replacements(":/tmp/x").unwrap_err().is_fatal());
    }

    #[test]
    fn test_unlisted_shader_is_untouched() {
        assert!(replace_shader(None, 1).unwrap().is_none());
        assert!(replace_shader(Some("2:/nonexistent"), 1).unwrap().is_none());
    }

    #[test]
    fn test_replacement_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x7fELF").unwrap();
        let list = format!("1:{}", file.path().display());

        assert_eq!(replace_shader(Some(&list), 1).unwrap(), Some(b"\x7fELF".to_vec()));
    }

    #[test]
    fn test_unreadable_file_is_not_fatal() {
        let err = replace_shader(Some("1:/nonexistent/shader.elf"), 1).unwrap_err();
        assert!(!err.is_fatal());
    }
}

//! VM fault detection from the kernel log
//!
//! The kernel driver reports a VM fault as a header line followed by a line
//! carrying the faulting address:
//!
//! ```text
//! [  301.512346] amdgpu 0000:03:00.0: [gfxhub] VMC page fault (src_id:0 ring:158 vm_id:2 pas_id:0)
//! [  301.512350] amdgpu 0000:03:00.0:   at page 0x0000000219f8f000 from 27
//! ```
//!
//! Older chips (graphics level 8 and below) report a page number instead:
//!
//! ```text
//! [  12.000001] radeon 0000:01:00.0: GPU fault detected: 146 0x0c08c80c
//! [  12.000002] radeon 0000:01:00.0:   VM_CONTEXT1_PROTECTION_FAULT_ADDR   0x00100A2B
//! ```

use log::{debug, warn};
use std::process::Command;

use super::monitor::{FaultCursor, FaultMonitor, VmFault};

struct FaultPattern {
    headers: &'static [&'static str],
    address_prefixes: &'static [&'static str],
    /// Left shift turning the reported value into a byte address
    address_shift: u32,
}

const GFX9_PATTERN: FaultPattern = FaultPattern {
    headers: &["VMC page fault", "page fault (src_id"],
    address_prefixes: &["at page", "in page starting at address"],
    address_shift: 0,
};

const LEGACY_PATTERN: FaultPattern = FaultPattern {
    headers: &["GPU fault detected:"],
    address_prefixes: &["VM_CONTEXT1_PROTECTION_FAULT_ADDR"],
    address_shift: 12,
};

/// Timestamp of a kernel log line in microseconds, and the message part
fn split_line(line: &str) -> Option<(u64, &str)> {
    let rest = line.trim_start().strip_prefix('[')?;
    let (stamp, message) = rest.split_once(']')?;
    let (secs, usecs) = stamp.trim().split_once('.')?;
    let secs: u64 = secs.parse().ok()?;
    let usecs: u64 = usecs.parse().ok()?;
    let stamp = secs.checked_mul(1_000_000)?.checked_add(usecs)?;
    Some((stamp, message))
}

fn parse_address(message: &str, pattern: &FaultPattern) -> Option<u64> {
    let at = pattern.address_prefixes.iter().find_map(|prefix| message.find(prefix))?;
    let hex = &message[at..];
    let digits = &hex[hex.find("0x")? + 2..];
    let end = digits.find(|c: char| !c.is_ascii_hexdigit()).unwrap_or(digits.len());
    let value = u64::from_str_radix(&digits[..end], 16).ok()?;
    value.checked_shl(pattern.address_shift)
}

/// Scan kernel log text for the first VM fault newer than `cursor`
///
/// The cursor always advances to the newest timestamp in `text`. With
/// `report` unset only the cursor moves, which is how a monitor is armed.
pub fn parse_dmesg(
    text: &str,
    gfx_level: u32,
    cursor: &mut FaultCursor,
    report: bool,
) -> Option<VmFault> {
    let pattern = if gfx_level >= 9 { &GFX9_PATTERN } else { &LEGACY_PATTERN };
    let mut newest = cursor.0;
    let mut header_seen = false;
    let mut fault = None;
    let mut unparsable = 0usize;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let Some((timestamp, message)) = split_line(line) else {
            unparsable += 1;
            continue;
        };
        newest = newest.max(timestamp);

        if !report || timestamp <= cursor.0 || fault.is_some() {
            continue;
        }

        if header_seen {
            fault = parse_address(message, pattern).map(|address| VmFault { address });
            header_seen = false;
        } else if pattern.headers.iter().any(|h| message.contains(h)) {
            header_seen = true;
        }
    }

    if unparsable > 0 {
        debug!("Skipped {unparsable} kernel log lines without a usable timestamp");
    }
    cursor.0 = newest;
    fault
}

/// Monitor reading the kernel log through `dmesg`
#[derive(Debug, Clone)]
pub struct DmesgFaultMonitor {
    gfx_level: u32,
}

impl DmesgFaultMonitor {
    #[must_use]
    pub fn new(gfx_level: u32) -> Self {
        Self { gfx_level }
    }

    fn read_kernel_log() -> Option<String> {
        match Command::new("dmesg").output() {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(output) => {
                warn!("dmesg exited with {}", output.status);
                None
            }
            Err(e) => {
                warn!("Failed to run dmesg: {e}");
                None
            }
        }
    }
}

impl FaultMonitor for DmesgFaultMonitor {
    fn poll(&mut self, cursor: &mut FaultCursor) -> Option<VmFault> {
        let text = Self::read_kernel_log()?;
        parse_dmesg(&text, self.gfx_level, cursor, true)
    }

    fn arm(&mut self, cursor: &mut FaultCursor) {
        if let Some(text) = Self::read_kernel_log() {
            parse_dmesg(&text, self.gfx_level, cursor, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GFX9_LOG: &str = "\
[  300.000001] amdgpu: ring gfx timeout
[  301.512346] amdgpu 0000:03:00.0: [gfxhub] VMC page fault (src_id:0 ring:158 vm_id:2 pas_id:0)
[  301.512350] amdgpu 0000:03:00.0:   at page 0x0000000219f8f000 from 27
[  301.512351] amdgpu 0000:03:00.0: VM_L2_PROTECTION_FAULT_STATUS:0x0020113C
";

    #[test]
    fn test_gfx9_fault_is_found() {
        let mut cursor = FaultCursor::default();
        let fault = parse_dmesg(GFX9_LOG, 9, &mut cursor, true);
        assert_eq!(fault, Some(VmFault { address: 0x2_19f8_f000 }));
        assert_eq!(cursor, FaultCursor(301_512_351));
    }

    #[test]
    fn test_armed_cursor_hides_old_faults() {
        let mut cursor = FaultCursor::default();
        assert_eq!(parse_dmesg(GFX9_LOG, 9, &mut cursor, false), None);
        assert_eq!(parse_dmesg(GFX9_LOG, 9, &mut cursor, true), None);
    }

    #[test]
    fn test_newer_kernel_wording() {
        let log = "\
[ 10.000001] amdgpu: [gfxhub0] no-retry page fault (src_id:0 ring:24 vmid:3 pasid:32769)
[ 10.000002] amdgpu:   in page starting at address 0x0000800104a00000 from client 0x1b (UTCL2)
";
        let fault = parse_dmesg(log, 10, &mut FaultCursor::default(), true);
        assert_eq!(fault, Some(VmFault { address: 0x8001_04a0_0000 }));
    }

    #[test]
    fn test_legacy_fault_reports_page_number() {
        let log = "\
[  12.000001] radeon 0000:01:00.0: GPU fault detected: 146 0x0c08c80c
[  12.000002] radeon 0000:01:00.0:   VM_CONTEXT1_PROTECTION_FAULT_ADDR   0x00100A2B
";
        let fault = parse_dmesg(log, 8, &mut FaultCursor::default(), true);
        assert_eq!(fault, Some(VmFault { address: 0x0010_0A2B << 12 }));
    }

    #[test]
    fn test_lines_without_timestamp_are_skipped() {
        let mut cursor = FaultCursor(5);
        assert_eq!(parse_dmesg("garbage\n\n", 9, &mut cursor, true), None);
        assert_eq!(cursor, FaultCursor(5));
    }

    #[test]
    fn test_overflowing_timestamp_is_skipped() {
        let log = "\
[18446744073709551615.000000] amdgpu: bogus clock
[  301.512346] amdgpu 0000:03:00.0: [gfxhub] VMC page fault (src_id:0 ring:158 vm_id:2 pas_id:0)
[  301.512350] amdgpu 0000:03:00.0:   at page 0x0000000219f8f000 from 27
";
        let mut cursor = FaultCursor::default();
        let fault = parse_dmesg(log, 9, &mut cursor, true);
        assert_eq!(fault, Some(VmFault { address: 0x2_19f8_f000 }));
        assert_eq!(cursor, FaultCursor(301_512_350));
    }
}

//! Fault detection interface

use std::collections::VecDeque;

/// Position in the fault source up to which faults were already seen
///
/// For the kernel log this is the timestamp of the newest line, in
/// microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FaultCursor(pub u64);

/// A GPU virtual-memory fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmFault {
    /// Faulting address (page-aligned)
    pub address: u64,
}

/// Source of VM fault notifications
pub trait FaultMonitor {
    /// Report the first fault newer than `cursor`, advancing it past
    /// everything examined
    fn poll(&mut self, cursor: &mut FaultCursor) -> Option<VmFault>;

    /// Advance `cursor` past every fault that already happened
    fn arm(&mut self, cursor: &mut FaultCursor) {
        let _ = self.poll(cursor);
    }
}

/// Monitor replaying a fixed sequence of poll results
///
/// The explicit script is replayed first; a fault scheduled with
/// [`ScriptedFaultMonitor::fault_after`] is counted down without storing the
/// quiet polls.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFaultMonitor {
    script: VecDeque<Option<VmFault>>,
    quiet_polls: usize,
    pending: Option<VmFault>,
    polls: usize,
}

impl ScriptedFaultMonitor {
    /// One entry per poll; polls past the end see no fault
    pub fn new(script: impl IntoIterator<Item = Option<VmFault>>) -> Self {
        Self { script: script.into_iter().collect(), ..Self::default() }
    }

    /// Fault on the `n`th poll, counting from zero
    #[must_use]
    pub fn fault_after(n: usize, address: u64) -> Self {
        Self { quiet_polls: n, pending: Some(VmFault { address }), ..Self::default() }
    }

    /// Polls performed so far, arming excluded
    #[must_use]
    pub fn polls(&self) -> usize {
        self.polls
    }
}

impl FaultMonitor for ScriptedFaultMonitor {
    fn poll(&mut self, cursor: &mut FaultCursor) -> Option<VmFault> {
        self.polls = self.polls.saturating_add(1);
        cursor.0 = cursor.0.saturating_add(1);
        if let Some(entry) = self.script.pop_front() {
            return entry;
        }
        if self.pending.is_some() && self.quiet_polls > 0 {
            self.quiet_polls -= 1;
            return None;
        }
        self.pending.take()
    }

    fn arm(&mut self, _cursor: &mut FaultCursor) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_monitor_replays_in_order() {
        let mut monitor = ScriptedFaultMonitor::fault_after(2, 0x1000);
        let mut cursor = FaultCursor::default();
        monitor.arm(&mut cursor);

        assert_eq!(monitor.poll(&mut cursor), None);
        assert_eq!(monitor.poll(&mut cursor), None);
        assert_eq!(monitor.poll(&mut cursor), Some(VmFault { address: 0x1000 }));
        assert_eq!(monitor.poll(&mut cursor), None);
        assert_eq!(monitor.polls(), 4);
        assert_eq!(cursor, FaultCursor(4));
    }

    #[test]
    fn test_distant_fault_stays_quiet() {
        let mut monitor = ScriptedFaultMonitor::fault_after(usize::MAX, 0x1000);
        let mut cursor = FaultCursor::default();

        for _ in 0..1000 {
            assert_eq!(monitor.poll(&mut cursor), None);
        }
        assert_eq!(monitor.polls(), 1000);
    }

    #[test]
    fn test_explicit_script_runs_out() {
        let fault = VmFault { address: 0x3000 };
        let mut monitor = ScriptedFaultMonitor::new([None, Some(fault)]);
        let mut cursor = FaultCursor::default();

        assert_eq!(monitor.poll(&mut cursor), None);
        assert_eq!(monitor.poll(&mut cursor), Some(fault));
        assert_eq!(monitor.poll(&mut cursor), None);
    }
}

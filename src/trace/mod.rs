//! The interleaving trace.
//!
//! When trace collection is on (the second pass over a failing invocation),
//! every switch, intercepted event, spin-cycle onset, and state snapshot is
//! appended to an ordered log. Append order equals the total order of
//! events: per-worker program order stitched together by baton hand-offs.
//! All diagnostics are rendered from this log.

pub mod report;

pub use report::TraceReport;

use crate::types::{ActorId, CodeLocation, WorkerId};
use std::fmt;

/// Why the scheduler moved the baton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SwitchReason {
    /// The search strategy asked for a context switch.
    Strategy,
    /// A spin cycle was detected; the worker makes no progress.
    ActiveLock,
    /// A spin cycle driven by growing recursion was detected.
    ActiveLockRecursive,
    /// The worker failed to acquire a monitor.
    LockWait,
    /// The worker waits for a monitor notification.
    MonitorWait,
    /// The worker's continuation suspended.
    Suspended,
}

impl fmt::Display for SwitchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strategy => write!(f, "switch"),
            Self::ActiveLock => write!(f, "switch (active lock detected)"),
            Self::ActiveLockRecursive => {
                write!(f, "switch (recursive active lock detected)")
            }
            Self::LockWait => write!(f, "switch (lock wait)"),
            Self::MonitorWait => write!(f, "switch (monitor wait)"),
            Self::Suspended => write!(f, "switch (suspended)"),
        }
    }
}

/// Kind of an intercepted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TracePointKind {
    /// Shared read.
    Read,
    /// Shared write.
    Write,
    /// Atomic method call.
    AtomicCall,
    /// Monitor acquisition.
    MonitorEnter,
    /// Monitor release.
    MonitorExit,
    /// Monitor wait.
    Wait,
    /// Monitor notification.
    Notify,
    /// Thread park.
    Park,
    /// Thread unpark.
    Unpark,
    /// Tracked method call.
    MethodCall,
    /// Coroutine suspension.
    Suspension,
}

impl TracePointKind {
    /// Stable, grep-friendly name.
    #[must_use]
    pub const fn stable_name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::AtomicCall => "atomic_call",
            Self::MonitorEnter => "monitor_enter",
            Self::MonitorExit => "monitor_exit",
            Self::Wait => "wait",
            Self::Notify => "notify",
            Self::Park => "park",
            Self::Unpark => "unpark",
            Self::MethodCall => "method_call",
            Self::Suspension => "suspension",
        }
    }
}

/// One intercepted event, with callsite context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracePoint {
    /// Worker that produced the event.
    pub worker: WorkerId,
    /// Actor the worker was running.
    pub actor: ActorId,
    /// Code location of the event.
    pub cl: CodeLocation,
    /// Event kind.
    pub kind: TracePointKind,
    /// Display label (field or method name).
    pub label: String,
    /// Value read or written, attached after the fact when known.
    pub value: Option<String>,
}

impl fmt::Display for TracePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.value) {
            (TracePointKind::Read, Some(value)) => {
                write!(f, "{} ➜ {value}", self.label)
            }
            (TracePointKind::Write, Some(value)) => {
                write!(f, "{} = {value}", self.label)
            }
            _ => write!(f, "{}", self.label),
        }
    }
}

/// One record of the interleaving trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    /// The baton moved away from `worker`.
    Switch {
        /// Outgoing worker.
        worker: WorkerId,
        /// Actor it was running.
        actor: ActorId,
        /// Why the baton moved.
        reason: SwitchReason,
        /// Call-stack labels at the switch, outermost first.
        stack: Vec<String>,
    },
    /// An intercepted event.
    CodeLocation {
        /// The event.
        point: TracePoint,
        /// Call-stack labels at the event, outermost first.
        stack: Vec<String>,
    },
    /// A data-structure state snapshot.
    StateRepresentation {
        /// Worker after whose event the snapshot was taken.
        worker: WorkerId,
        /// Actor it was running.
        actor: ActorId,
        /// The snapshot.
        representation: String,
        /// Call stack of the preceding point.
        stack: Vec<String>,
    },
    /// First iteration of a spin cycle begins here.
    SpinCycleStart {
        /// Spinning worker.
        worker: WorkerId,
        /// Actor it was running.
        actor: ActorId,
        /// Call-stack labels at the cycle start, corrected per the marker
        /// policy.
        stack: Vec<String>,
    },
    /// A non-blocking actor blocked or spun; the invocation was aborted.
    ObstructionFreedomAbort {
        /// Offending worker.
        worker: WorkerId,
        /// Actor it was running.
        actor: ActorId,
        /// Call stack at the abort.
        stack: Vec<String>,
    },
    /// The worker finished its column.
    Finish {
        /// Finished worker.
        worker: WorkerId,
    },
}

impl TraceEntry {
    /// The worker this entry belongs to.
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        match self {
            Self::Switch { worker, .. }
            | Self::StateRepresentation { worker, .. }
            | Self::SpinCycleStart { worker, .. }
            | Self::ObstructionFreedomAbort { worker, .. }
            | Self::Finish { worker } => *worker,
            Self::CodeLocation { point, .. } => point.worker,
        }
    }
}

/// Bookkeeping for the spin-cycle marker of the current spin run.
#[derive(Debug, Clone, Copy)]
struct SpinMarker {
    entry_index: usize,
    depth: usize,
}

/// Append-only log of the interleaving.
#[derive(Debug)]
pub struct TraceCollector {
    enabled: bool,
    entries: Vec<TraceEntry>,
    marker: Option<SpinMarker>,
}

impl TraceCollector {
    /// Creates a collector; entries are recorded only when `enabled`.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Vec::new(),
            marker: None,
        }
    }

    /// True when trace collection is on.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records a baton switch.
    pub fn switch(
        &mut self,
        worker: WorkerId,
        actor: ActorId,
        reason: SwitchReason,
        stack: Vec<String>,
    ) {
        if self.enabled {
            self.entries.push(TraceEntry::Switch {
                worker,
                actor,
                reason,
                stack,
            });
        }
    }

    /// Records an intercepted event.
    pub fn code_location(&mut self, point: TracePoint, stack: Vec<String>) {
        if self.enabled {
            self.note_cycle_depth(stack.len());
            self.entries.push(TraceEntry::CodeLocation { point, stack });
        }
    }

    /// Attaches a value to the most recent code-location entry.
    pub fn attach_value(&mut self, value: String) {
        if !self.enabled {
            return;
        }
        if let Some(TraceEntry::CodeLocation { point, .. }) = self.entries.last_mut() {
            point.value = Some(value);
        }
    }

    /// Records a state snapshot, attributed to the preceding point's stack.
    pub fn state_representation(&mut self, worker: WorkerId, actor: ActorId, repr: String) {
        if self.enabled {
            let stack = match self.entries.last() {
                Some(
                    TraceEntry::CodeLocation { stack, .. } | TraceEntry::Switch { stack, .. },
                ) => stack.clone(),
                _ => Vec::new(),
            };
            self.entries.push(TraceEntry::StateRepresentation {
                worker,
                actor,
                representation: repr,
                stack,
            });
        }
    }

    /// Records an obstruction-freedom abort.
    pub fn obstruction_freedom_abort(
        &mut self,
        worker: WorkerId,
        actor: ActorId,
        stack: Vec<String>,
    ) {
        if self.enabled {
            self.entries.push(TraceEntry::ObstructionFreedomAbort {
                worker,
                actor,
                stack,
            });
        }
    }

    /// Records that a worker finished its column.
    pub fn finish(&mut self, worker: WorkerId) {
        if self.enabled {
            self.entries.push(TraceEntry::Finish { worker });
        }
    }

    /// Inserts the spin-cycle marker, once per spin run.
    ///
    /// If the cycle's first event is a tracked method call, the current
    /// stack already includes that method; the marker is lifted outside the
    /// call by dropping the innermost frame.
    pub fn spin_cycle_start(
        &mut self,
        worker: WorkerId,
        actor: ActorId,
        mut stack: Vec<String>,
        first_event_is_method_call: bool,
    ) {
        if !self.enabled || self.marker.is_some() {
            return;
        }
        if first_event_is_method_call {
            stack.pop();
        }
        let depth = stack.len();
        self.marker = Some(SpinMarker {
            entry_index: self.entries.len(),
            depth,
        });
        self.entries.push(TraceEntry::SpinCycleStart {
            worker,
            actor,
            stack,
        });
    }

    /// Retroactively truncates the marker when a later iteration reveals a
    /// shallower true cycle start.
    fn note_cycle_depth(&mut self, depth: usize) {
        let Some(marker) = &mut self.marker else {
            return;
        };
        if depth >= marker.depth {
            return;
        }
        marker.depth = depth;
        let index = marker.entry_index;
        if let Some(TraceEntry::SpinCycleStart { stack, .. }) = self.entries.get_mut(index) {
            stack.truncate(depth);
        }
    }

    /// Ends the current spin run at its active-lock switch.
    ///
    /// Returns `true` when the cycle is recursive: the call depth at the
    /// switch strictly exceeds the marker's depth. A recursive cycle's
    /// marker is trimmed one more level to surface the recursion.
    pub fn end_spin_run(&mut self, depth_at_switch: usize) -> bool {
        let Some(marker) = self.marker.take() else {
            return false;
        };
        if depth_at_switch <= marker.depth {
            return false;
        }
        if let Some(TraceEntry::SpinCycleStart { stack, .. }) =
            self.entries.get_mut(marker.entry_index)
        {
            stack.pop();
        }
        true
    }

    /// True while a spin-cycle marker is open for the current run.
    #[must_use]
    pub const fn in_spin_run(&self) -> bool {
        self.marker.is_some()
    }

    /// The recorded entries, in total order.
    #[must_use]
    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Takes the recorded entries, leaving the collector empty.
    pub fn take_entries(&mut self) -> Vec<TraceEntry> {
        self.marker = None;
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn point(worker: usize, kind: TracePointKind, label: &str) -> TracePoint {
        TracePoint {
            worker: WorkerId(worker),
            actor: 0,
            cl: CodeLocation(8),
            kind,
            label: label.to_string(),
            value: None,
        }
    }

    #[test]
    fn disabled_collector_records_nothing() {
        init_test_logging();
        let mut collector = TraceCollector::new(false);
        collector.switch(WorkerId(0), 0, SwitchReason::Strategy, Vec::new());
        collector.code_location(point(0, TracePointKind::Read, "x"), Vec::new());
        assert!(collector.entries().is_empty());
    }

    #[test]
    fn entries_preserve_append_order() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        collector.code_location(point(0, TracePointKind::Read, "x"), Vec::new());
        collector.switch(WorkerId(0), 0, SwitchReason::Strategy, Vec::new());
        collector.code_location(point(1, TracePointKind::Write, "x"), Vec::new());
        collector.finish(WorkerId(1));
        let entries = collector.entries();
        assert_eq!(entries.len(), 4);
        assert!(matches!(entries[0], TraceEntry::CodeLocation { .. }));
        assert!(matches!(entries[1], TraceEntry::Switch { .. }));
        assert!(matches!(entries[3], TraceEntry::Finish { .. }));
    }

    #[test]
    fn attach_value_targets_last_code_location() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        collector.code_location(point(0, TracePointKind::Read, "x"), Vec::new());
        collector.attach_value("7".to_string());
        let Some(TraceEntry::CodeLocation { point, .. }) = collector.entries().last() else {
            panic!("expected code location");
        };
        assert_eq!(point.value.as_deref(), Some("7"));
    }

    #[test]
    fn spin_marker_inserted_once_per_run() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        collector.spin_cycle_start(WorkerId(0), 0, vec!["cas()".to_string()], false);
        collector.spin_cycle_start(WorkerId(0), 0, vec!["cas()".to_string()], false);
        let markers = collector
            .entries()
            .iter()
            .filter(|e| matches!(e, TraceEntry::SpinCycleStart { .. }))
            .count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn marker_lifted_outside_method_call() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        let stack = vec!["outer()".to_string(), "cas()".to_string()];
        collector.spin_cycle_start(WorkerId(0), 0, stack, true);
        let Some(TraceEntry::SpinCycleStart { stack, .. }) = collector.entries().first() else {
            panic!("expected marker");
        };
        assert_eq!(stack, &["outer()".to_string()]);
    }

    #[test]
    fn marker_truncated_to_shallower_cycle_start() {
        init_test_logging();
        crate::test_phase!("marker_truncated_to_shallower_cycle_start");
        let mut collector = TraceCollector::new(true);
        let deep = vec!["outer()".to_string(), "inner()".to_string()];
        collector.spin_cycle_start(WorkerId(0), 0, deep, false);
        // A later iteration event at depth 1 reveals the true start.
        collector.code_location(
            point(0, TracePointKind::Read, "flag"),
            vec!["outer()".to_string()],
        );
        let Some(TraceEntry::SpinCycleStart { stack, .. }) = collector.entries().first() else {
            panic!("expected marker");
        };
        assert_eq!(stack.len(), 1);
        crate::test_complete!("marker_truncated_to_shallower_cycle_start");
    }

    #[test]
    fn recursive_cycle_trims_marker() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        collector.spin_cycle_start(WorkerId(0), 0, vec!["rec()".to_string()], false);
        // At the switch the worker is two frames deeper: recursion.
        let recursive = collector.end_spin_run(3);
        assert!(recursive);
        let Some(TraceEntry::SpinCycleStart { stack, .. }) = collector.entries().first() else {
            panic!("expected marker");
        };
        assert!(stack.is_empty());
        assert!(!collector.in_spin_run());
    }

    #[test]
    fn non_recursive_cycle_keeps_marker_stack() {
        init_test_logging();
        let mut collector = TraceCollector::new(true);
        collector.spin_cycle_start(WorkerId(0), 0, vec!["cas()".to_string()], false);
        assert!(!collector.end_spin_run(1));
    }
}

//! Per-worker call stacks, stable across suspension.
//!
//! Every recorded event carries the call-stack snapshot of its worker so
//! the trace can be rendered with callsite indentation. A suspended method
//! call must keep the same identity when its continuation resumes; the
//! tracker mints method identifiers and preserves them through a parallel
//! suspended-method stack.

use crate::types::{MethodId, WorkerId};
use smallvec::SmallVec;

/// One frame of a worker's call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Identity of this method call, stable across suspension.
    pub method_id: MethodId,
    /// Display label of the call (method name and arguments).
    pub label: String,
}

/// A snapshot of one worker's call stack at the moment of an event.
pub type StackSnapshot = SmallVec<[CallFrame; 4]>;

/// Tracks call stacks for all workers of an invocation.
#[derive(Debug)]
pub struct CallStackTracker {
    stacks: Vec<StackSnapshot>,
    /// Method ids of suspended calls, popped on resumption so the resumed
    /// call keeps its identity in the trace.
    suspended: Vec<SmallVec<[MethodId; 4]>>,
    next_method_id: u64,
}

impl CallStackTracker {
    /// Creates a tracker for `width` workers.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            stacks: vec![SmallVec::new(); width],
            suspended: vec![SmallVec::new(); width],
            next_method_id: 1,
        }
    }

    /// Pushes a call frame for `worker`.
    ///
    /// If the worker resumes a suspended call, the preserved method id is
    /// reused; otherwise a fresh one is minted.
    pub fn push(&mut self, worker: WorkerId, label: String) -> MethodId {
        let method_id = self.suspended[worker.index()].pop().unwrap_or_else(|| {
            let id = MethodId(self.next_method_id);
            self.next_method_id += 1;
            id
        });
        self.stacks[worker.index()].push(CallFrame { method_id, label });
        method_id
    }

    /// Pops the top call frame for `worker`.
    ///
    /// When the finished call suspended (rather than returning), its method
    /// id is preserved for the resumption.
    pub fn pop(&mut self, worker: WorkerId, was_suspended: bool) -> Option<MethodId> {
        let frame = self.stacks[worker.index()].pop()?;
        if was_suspended {
            self.suspended[worker.index()].push(frame.method_id);
        }
        Some(frame.method_id)
    }

    /// Current call depth of `worker`.
    #[must_use]
    pub fn depth(&self, worker: WorkerId) -> usize {
        self.stacks[worker.index()].len()
    }

    /// Snapshot of the worker's stack, outermost call first.
    #[must_use]
    pub fn snapshot(&self, worker: WorkerId) -> StackSnapshot {
        self.stacks[worker.index()].clone()
    }

    /// True when the worker's stack is empty (actor boundary).
    #[must_use]
    pub fn is_empty(&self, worker: WorkerId) -> bool {
        self.stacks[worker.index()].is_empty()
    }

    /// Clears the worker's stack at an actor boundary.
    pub fn clear(&mut self, worker: WorkerId) {
        self.stacks[worker.index()].clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn push_pop_tracks_depth() {
        init_test_logging();
        let mut tracker = CallStackTracker::new(1);
        let w = WorkerId(0);
        assert!(tracker.is_empty(w));
        tracker.push(w, "outer()".to_string());
        tracker.push(w, "inner()".to_string());
        assert_eq!(tracker.depth(w), 2);
        tracker.pop(w, false);
        assert_eq!(tracker.depth(w), 1);
        tracker.pop(w, false);
        assert!(tracker.is_empty(w));
    }

    #[test]
    fn suspended_call_keeps_method_id() {
        init_test_logging();
        crate::test_phase!("suspended_call_keeps_method_id");
        let mut tracker = CallStackTracker::new(1);
        let w = WorkerId(0);
        let first = tracker.push(w, "send()".to_string());
        // The call suspends instead of returning.
        tracker.pop(w, true);
        // Unrelated call in between mints a fresh id only after the
        // suspended stack is drained, so resume first.
        let resumed = tracker.push(w, "send()".to_string());
        assert_eq!(first, resumed);
        tracker.pop(w, false);
        let fresh = tracker.push(w, "get()".to_string());
        assert_ne!(first, fresh);
        crate::test_complete!("suspended_call_keeps_method_id");
    }

    #[test]
    fn workers_are_independent() {
        init_test_logging();
        let mut tracker = CallStackTracker::new(2);
        let a = tracker.push(WorkerId(0), "a()".to_string());
        let b = tracker.push(WorkerId(1), "b()".to_string());
        assert_ne!(a, b);
        assert_eq!(tracker.depth(WorkerId(0)), 1);
        assert_eq!(tracker.depth(WorkerId(1)), 1);
    }

    #[test]
    fn snapshot_is_outermost_first() {
        init_test_logging();
        let mut tracker = CallStackTracker::new(1);
        let w = WorkerId(0);
        tracker.push(w, "outer()".to_string());
        tracker.push(w, "inner()".to_string());
        let snapshot = tracker.snapshot(w);
        assert_eq!(snapshot[0].label, "outer()");
        assert_eq!(snapshot[1].label, "inner()");
    }
}

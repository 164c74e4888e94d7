//! Interleaving histories, the spin-cycle tracking set, and replay.
//!
//! An invocation is summarized as a sequence of [`HistoryNode`]s, one per
//! worker-run. Interleavings that were observed to end in a spin cycle are
//! merged into a prefix trie (the *tracking set*); a cursor walks the trie
//! as the current invocation progresses and reports when the worker has
//! entered a cycle known from an earlier invocation, so the scheduler can
//! switch early instead of spinning up to the detection threshold again.
//!
//! Replay mode drives a later invocation along a pre-recorded history:
//! every intercepted event advances a counter, and the helper advises a
//! switch when the counter reaches the recorded run length plus one full
//! cycle period.

use crate::types::{CodeLocation, WorkerId};
use std::collections::VecDeque;

/// How a worker-run ended.
///
/// Replay only *advises* switches for runs the strategy or the spin
/// detector cut short; runs that ended in semantic switches (lock wait,
/// monitor wait, suspension) or by finishing the column reproduce
/// naturally from the same tracker state, and advising them early would
/// reorder shared accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunEnd {
    /// The run was cut by an invocation abort, or is still in progress.
    #[default]
    None,
    /// The strategy took a switch opportunity.
    Strategy,
    /// The spin detector forced an active-lock switch.
    ActiveLock,
    /// A semantic switch: lock wait, monitor wait, or suspension.
    Semantic,
    /// The worker finished its actor column.
    Finish,
}

/// Summary of one worker-run within an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryNode {
    /// The worker that held the baton.
    pub worker: WorkerId,
    /// Events executed before the spin cycle (or in the whole run when no
    /// cycle was found), counting switch points and helpers.
    pub executions: usize,
    /// Same, additionally counting value-view pseudo-events.
    pub executions_with_extra_events: usize,
    /// Length of one cycle iteration counting switch points and helpers
    /// only, 0 when the run ended without an identified period. This is the
    /// unit the early-detection cursor works in, since value views are not
    /// delivered on first passes.
    pub spin_cycle_period: usize,
    /// Length of one cycle iteration counting value-view pseudo-events too;
    /// the unit the replay helper works in.
    pub spin_cycle_period_with_extra: usize,
    /// XOR of the switch-point code locations inside one period, so replay
    /// recognizes the cycle regardless of variable lead-ins.
    pub execution_hash: u64,
    /// The run ended inside a live region (with or without a period).
    pub cycle_detected: bool,
    /// How the run ended.
    pub ended_by: RunEnd,
}

impl HistoryNode {
    /// Starts an empty node for `worker`.
    #[must_use]
    pub const fn start(worker: WorkerId) -> Self {
        Self {
            worker,
            executions: 0,
            executions_with_extra_events: 0,
            spin_cycle_period: 0,
            spin_cycle_period_with_extra: 0,
            execution_hash: 0,
            cycle_detected: false,
            ended_by: RunEnd::None,
        }
    }
}

/// Folds a switch-point code location into a cycle hash.
#[inline]
#[allow(clippy::cast_sign_loss)]
pub(crate) fn fold_hash(hash: u64, cl: CodeLocation) -> u64 {
    hash ^ u64::from(cl.0 as u32)
}

#[derive(Debug, Clone)]
struct TrackedNode {
    node: HistoryNode,
    children: Vec<usize>,
}

/// Prefix trie of interleavings known to lead to spin cycles.
///
/// Persists across invocations; the driver moves it into each invocation's
/// loop detector and retrieves it afterwards.
#[derive(Debug, Clone, Default)]
pub struct CycleTrackingSet {
    arena: Vec<TrackedNode>,
    roots: Vec<usize>,
}

impl CycleTrackingSet {
    /// Creates an empty tracking set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges an interleaving that ended in a spin cycle.
    pub fn add_interleaving(&mut self, history: &[HistoryNode]) {
        let mut slot: Option<usize> = None;
        for node in history {
            let children = match slot {
                None => &self.roots,
                Some(parent) => &self.arena[parent].children,
            };
            let found = children
                .iter()
                .copied()
                .find(|&idx| self.matches(idx, node));
            let idx = match found {
                Some(idx) => {
                    // Prefer the richer cycle description.
                    if node.cycle_detected && !self.arena[idx].node.cycle_detected {
                        self.arena[idx].node = node.clone();
                    }
                    idx
                }
                None => {
                    let idx = self.arena.len();
                    self.arena.push(TrackedNode {
                        node: node.clone(),
                        children: Vec::new(),
                    });
                    match slot {
                        None => self.roots.push(idx),
                        Some(parent) => self.arena[parent].children.push(idx),
                    }
                    idx
                }
            };
            slot = Some(idx);
        }
    }

    fn matches(&self, idx: usize, node: &HistoryNode) -> bool {
        let tracked = &self.arena[idx].node;
        tracked.worker == node.worker
            && (tracked.cycle_detected
                || node.cycle_detected
                || tracked.executions == node.executions)
    }

    /// Number of distinct nodes stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    /// True when no interleaving has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

/// Incremental position within the tracking set for the current invocation.
#[derive(Debug, Clone)]
pub struct TrackingCursor {
    /// Arena index of the node describing the current worker-run, when the
    /// invocation still follows a known interleaving.
    position: Option<usize>,
    active: bool,
    executions: usize,
    executions_with_extra: usize,
    window: VecDeque<CodeLocation>,
    window_hash: u64,
}

impl TrackingCursor {
    /// Positions a fresh cursor at the first worker-run of an invocation.
    #[must_use]
    pub fn start(set: &CycleTrackingSet, first: WorkerId) -> Self {
        let position = set
            .roots
            .iter()
            .copied()
            .find(|&idx| set.arena[idx].node.worker == first);
        Self {
            active: position.is_some() || !set.is_empty(),
            position,
            executions: 0,
            executions_with_extra: 0,
            window: VecDeque::new(),
            window_hash: 0,
        }
    }

    /// Advances past a worker switch.
    pub fn on_switch(&mut self, set: &CycleTrackingSet, next: WorkerId) {
        self.executions = 0;
        self.executions_with_extra = 0;
        self.window.clear();
        self.window_hash = 0;
        let Some(current) = self.position else {
            self.active = false;
            return;
        };
        self.position = set.arena[current]
            .children
            .iter()
            .copied()
            .find(|&idx| set.arena[idx].node.worker == next);
        if self.position.is_none() {
            self.active = false;
        }
    }

    /// Feeds one intercepted event.
    ///
    /// The sliding window works in switch-point/helper units: value views
    /// are only counted, never windowed, so the cursor behaves identically
    /// whether or not the current pass delivers them.
    pub fn on_execution(&mut self, set: &CycleTrackingSet, cl: CodeLocation) {
        if !self.active {
            return;
        }
        self.executions_with_extra += 1;
        if cl.is_value_view() {
            return;
        }
        self.executions += 1;
        let Some(idx) = self.position else {
            return;
        };
        let period = set.arena[idx].node.spin_cycle_period;
        if period == 0 {
            return;
        }
        self.window.push_back(cl);
        if cl.is_switch_point() {
            self.window_hash = fold_hash(self.window_hash, cl);
        }
        if self.window.len() > period {
            let evicted = self.window.pop_front().expect("window non-empty");
            if evicted.is_switch_point() {
                self.window_hash = fold_hash(self.window_hash, evicted);
            }
        }
    }

    /// True when the current worker has entered a cycle known from an
    /// earlier invocation.
    #[must_use]
    pub fn is_in_cycle(&self, set: &CycleTrackingSet) -> bool {
        let Some(idx) = self.position else {
            return false;
        };
        let node = &set.arena[idx].node;
        if !node.cycle_detected {
            return false;
        }
        if node.spin_cycle_period == 0 {
            return self.executions >= node.executions && node.executions > 0;
        }
        self.executions >= node.executions + node.spin_cycle_period
            && self.window.len() == node.spin_cycle_period
            && self.window_hash == node.execution_hash
    }

    /// The known cycle description at the cursor, when inside one.
    #[must_use]
    pub fn cycle<'a>(&self, set: &'a CycleTrackingSet) -> Option<&'a HistoryNode> {
        let idx = self.position?;
        let node = &set.arena[idx].node;
        node.cycle_detected.then_some(node)
    }
}

/// Advice produced by the replay helper for one intercepted event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayAdvice {
    /// The scheduler must switch away from the current worker now.
    pub switch_now: bool,
    /// The current worker-run is a replayed live region.
    pub spin: bool,
    /// This event is the first event of the replayed cycle.
    pub entered_cycle: bool,
    /// The final recorded switch was reached and the originating failure
    /// was a hang: escalate to a deadlock verdict.
    pub escalate_deadlock: bool,
}

/// Drives an invocation deterministically along a recorded interleaving.
#[derive(Debug, Clone)]
pub struct ReplayHelper {
    history: Vec<HistoryNode>,
    index: usize,
    executions: usize,
    origin_is_hang: bool,
    counts_views: bool,
}

impl ReplayHelper {
    /// Creates a helper for the recorded `history`.
    ///
    /// `origin_is_hang` marks that the failure being replayed was a
    /// deadlock or livelock, so reaching the end of the recording raises a
    /// deadlock rather than running past the recording. `counts_views`
    /// must match whether the recorded pass delivered value views, so
    /// event counts line up between recording and replay.
    #[must_use]
    pub fn new(history: Vec<HistoryNode>, origin_is_hang: bool, counts_views: bool) -> Self {
        Self {
            history,
            index: 0,
            executions: 0,
            origin_is_hang,
            counts_views,
        }
    }

    /// True when value views count toward the replayed event totals.
    #[must_use]
    pub const fn counts_value_views(&self) -> bool {
        self.counts_views
    }

    fn current(&self) -> Option<&HistoryNode> {
        self.history.get(self.index)
    }

    /// The worker recorded to run after the current node's switch.
    #[must_use]
    pub fn next_worker(&self) -> Option<WorkerId> {
        self.history.get(self.index + 1).map(|node| node.worker)
    }

    /// True while the replayed run is inside its recorded spin cycle.
    #[must_use]
    pub fn currently_in_spin_cycle(&self) -> bool {
        self.current().is_some_and(|node| {
            node.cycle_detected && self.executions > node.executions_with_extra_events
        })
    }

    /// Period of the cycle in the current node, 0 when none.
    #[must_use]
    pub fn current_cycle_period(&self) -> usize {
        self.current().map_or(0, |node| node.spin_cycle_period)
    }

    /// True when the current node describes a live region.
    #[must_use]
    pub fn is_active_lock_node(&self) -> bool {
        self.current().is_some_and(|node| node.cycle_detected)
    }

    /// Feeds one intercepted event and returns the scheduling advice.
    pub fn on_event(&mut self) -> ReplayAdvice {
        let Some(node) = self.current() else {
            return ReplayAdvice::default();
        };
        let cycle_detected = node.cycle_detected;
        let executions_with_extra_events = node.executions_with_extra_events;
        let spin_cycle_period_with_extra = node.spin_cycle_period_with_extra;
        let ended_by = node.ended_by;
        self.executions += 1;
        let mut advice = ReplayAdvice {
            spin: cycle_detected,
            entered_cycle: cycle_detected && self.executions == executions_with_extra_events + 1,
            ..ReplayAdvice::default()
        };
        // Only strategy- and spin-ended runs get advised switches; all
        // other run boundaries reproduce from the engine's own semantics.
        let target = match ended_by {
            RunEnd::Strategy => Some(executions_with_extra_events),
            RunEnd::ActiveLock => {
                Some(executions_with_extra_events + spin_cycle_period_with_extra)
            }
            RunEnd::None if cycle_detected => {
                Some(executions_with_extra_events + spin_cycle_period_with_extra)
            }
            RunEnd::None | RunEnd::Semantic | RunEnd::Finish => None,
        };
        if target.is_some_and(|target| self.executions >= target) {
            advice.switch_now = true;
            if self.index + 1 == self.history.len() && self.origin_is_hang {
                advice.escalate_deadlock = true;
            }
        }
        advice
    }

    /// Advances to the next recorded worker-run.
    pub fn on_switch(&mut self) {
        self.index += 1;
        self.executions = 0;
    }
}

/// Truncates a failing invocation's history for replay: everything up to
/// the last live region, with that region cut to its lead-in plus one full
/// cycle.
#[must_use]
pub fn truncate_for_replay(mut history: Vec<HistoryNode>) -> Vec<HistoryNode> {
    if let Some(last_cyclic) = history.iter().rposition(|node| node.cycle_detected) {
        history.truncate(last_cyclic + 1);
    }
    history
}

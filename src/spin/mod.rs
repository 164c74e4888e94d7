//! The spin-loop detector.
//!
//! Operates in two modes:
//!
//! - **Default**: counts per-location visits within the current worker-run.
//!   A location visited more often than the detection threshold means the
//!   worker is likely spinning; the detector either aborts the invocation
//!   so it can be re-run with value-view tracking enabled (first pass), or
//!   identifies the cycle in the run's event history and aborts so the
//!   search can continue with the measured period installed (second pass).
//!   Cycles known from earlier invocations are recognized *early* through
//!   the tracking-set cursor, costing one period instead of a full
//!   threshold of iterations.
//! - **Replay**: reproduces a previously summarized interleaving exactly,
//!   advising a switch after each recorded run length (plus one cycle
//!   period for live regions) so the trace collector can capture one clean
//!   iteration of each cycle.

pub mod cycle;
pub mod tracking;

pub use tracking::{truncate_for_replay, CycleTrackingSet, HistoryNode, ReplayHelper, RunEnd};

use crate::types::{CodeLocation, WorkerId};
use crate::util::DetHashMap;
use tracking::{fold_hash, TrackingCursor};

/// Sudden verdicts that abort the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DetectorSudden {
    /// A spin cycle was found for the first time; the same interleaving
    /// must be replayed with value-view tracking to measure the period.
    FirstDetection,
    /// The cycle period was measured; execution can continue in the next
    /// attempt, switching early at the now-known cycle.
    PeriodMeasured,
    /// The global execution ceiling was exceeded.
    Livelock,
    /// Replay reached the final recorded switch of a hang: deadlock.
    ReplayDeadlock,
}

/// Outcome of feeding one intercepted event to the detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Visit {
    /// The caller must switch away from the current worker.
    pub must_switch: bool,
    /// The switch is caused by spin detection (active lock), not strategy.
    pub spin: bool,
    /// This event is the first event of a replayed spin cycle.
    pub entered_cycle: bool,
    /// The invocation must be aborted with this verdict.
    pub sudden: Option<DetectorSudden>,
}

impl Visit {
    const NONE: Self = Self {
        must_switch: false,
        spin: false,
        entered_cycle: false,
        sudden: None,
    };

    const fn sudden(kind: DetectorSudden) -> Self {
        Self {
            must_switch: false,
            spin: false,
            entered_cycle: false,
            sudden: Some(kind),
        }
    }
}

/// Per-invocation spin-loop detector.
#[derive(Debug)]
pub(crate) struct LoopDetector {
    threshold: usize,
    livelock_threshold: u64,
    /// Value views are delivered into the event history (measuring pass and
    /// replay pass).
    extra_tracking: bool,
    replay: Option<ReplayHelper>,
    /// Visit counts per code location, cleared on every switch.
    visit_counts: DetHashMap<i32, usize>,
    /// Event history of the current worker-run, cleared on every switch.
    history: Vec<i32>,
    /// Node under construction for the current worker-run.
    current_node: HistoryNode,
    /// Completed worker-runs of this invocation.
    interleavings: Vec<HistoryNode>,
    /// Interleavings known to end in spin cycles, across invocations.
    tracking: CycleTrackingSet,
    cursor: TrackingCursor,
    total_executions: u64,
}

impl LoopDetector {
    pub(crate) fn new(
        threshold: usize,
        livelock_threshold: u64,
        extra_tracking: bool,
        tracking: CycleTrackingSet,
        replay: Option<ReplayHelper>,
        first_worker: WorkerId,
    ) -> Self {
        let cursor = TrackingCursor::start(&tracking, first_worker);
        Self {
            threshold,
            livelock_threshold,
            extra_tracking: extra_tracking || replay.is_some(),
            replay,
            visit_counts: DetHashMap::default(),
            history: Vec::new(),
            current_node: HistoryNode::start(first_worker),
            interleavings: Vec::new(),
            tracking,
            cursor,
            total_executions: 0,
        }
    }

    /// True when the detector replays a recorded interleaving.
    pub(crate) const fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    /// The worker the recorded interleaving switches to next.
    pub(crate) fn replay_next_worker(&self) -> Option<WorkerId> {
        self.replay.as_ref().and_then(ReplayHelper::next_worker)
    }

    pub(crate) const fn total_executions(&self) -> u64 {
        self.total_executions
    }

    /// Feeds one intercepted event, implementing the detection contract.
    pub(crate) fn visit(&mut self, cl: CodeLocation) -> Visit {
        if cl == CodeLocation::SUSPENSION {
            // The suspension sentinel never contributes to loop counts.
            return Visit::NONE;
        }
        if let Some(replay) = &mut self.replay {
            if cl.is_value_view() && !replay.counts_value_views() {
                return Visit::NONE;
            }
            self.history.push(cl.0);
            let advice = replay.on_event();
            return Visit {
                must_switch: advice.switch_now,
                spin: advice.spin,
                entered_cycle: advice.entered_cycle,
                sudden: advice
                    .escalate_deadlock
                    .then_some(DetectorSudden::ReplayDeadlock),
            };
        }

        self.total_executions += 1;
        if cl.is_value_view() {
            if self.extra_tracking {
                self.history.push(cl.0);
                self.current_node.executions_with_extra_events += 1;
                self.cursor.on_execution(&self.tracking, cl);
            }
            // Value views are pseudo-events, never switch points.
            return Visit::NONE;
        }

        self.history.push(cl.0);
        self.current_node.executions += 1;
        self.current_node.executions_with_extra_events += 1;
        self.cursor.on_execution(&self.tracking, cl);

        let count = {
            let entry = self.visit_counts.entry(cl.0).or_insert(0);
            *entry += 1;
            *entry
        };
        let detected_first_time = count > self.threshold;
        let detected_early = self.cursor.is_in_cycle(&self.tracking);

        if detected_first_time && !detected_early {
            if self.extra_tracking {
                self.identify_cycle();
            }
            let sudden = if self.total_executions > self.livelock_threshold {
                DetectorSudden::Livelock
            } else if self.extra_tracking {
                DetectorSudden::PeriodMeasured
            } else {
                DetectorSudden::FirstDetection
            };
            return Visit::sudden(sudden);
        }

        if detected_early && !detected_first_time {
            // The cycle is known from an earlier invocation: charge its
            // amortized cost and adopt the known description in place.
            self.total_executions += self.threshold as u64;
            if let Some(known) = self.cursor.cycle(&self.tracking).cloned() {
                self.current_node = HistoryNode {
                    worker: self.current_node.worker,
                    ..known
                };
            }
            if self.total_executions > self.livelock_threshold {
                return Visit::sudden(DetectorSudden::Livelock);
            }
            return Visit {
                must_switch: true,
                spin: true,
                entered_cycle: false,
                sudden: None,
            };
        }

        Visit {
            must_switch: detected_first_time || detected_early,
            spin: detected_first_time || detected_early,
            entered_cycle: false,
            sudden: None,
        }
    }

    /// Identifies the cycle in the current run's history and installs it in
    /// the node under construction.
    ///
    /// Two attempts: first over the full history including value views,
    /// then over the history filtered to switch-point and method events.
    /// When both fail the node is tagged as a live region of period 0.
    fn identify_cycle(&mut self) {
        let bounds = cycle::find_cycle(&self.history).or_else(|| {
            let filtered: Vec<i32> = self.history.iter().copied().filter(|&e| e >= 0).collect();
            cycle::find_cycle(&filtered)
                .and_then(|b| cycle::map_to_unfiltered(&self.history, |e| e >= 0, b))
        });
        match bounds {
            Some(bounds) => {
                let one_period = &self.history[bounds.prefix..bounds.prefix + bounds.period];
                let hash = one_period
                    .iter()
                    .map(|&e| CodeLocation(e))
                    .filter(|cl| cl.is_switch_point())
                    .fold(0u64, fold_hash);
                self.current_node.executions = self.history[..bounds.prefix]
                    .iter()
                    .filter(|&&e| e >= 0)
                    .count();
                self.current_node.executions_with_extra_events = bounds.prefix;
                self.current_node.spin_cycle_period =
                    one_period.iter().filter(|&&e| e >= 0).count();
                self.current_node.spin_cycle_period_with_extra = bounds.period;
                self.current_node.execution_hash = hash;
                self.current_node.cycle_detected = true;
            }
            None => {
                // Live region whose period could not be determined.
                self.current_node.spin_cycle_period = 0;
                self.current_node.spin_cycle_period_with_extra = 0;
                self.current_node.execution_hash = 0;
                self.current_node.cycle_detected = true;
            }
        }
    }

    /// Records the upcoming switch: finalizes the current node with how it
    /// ended and resets per-run state.
    pub(crate) fn on_switch(&mut self, next: WorkerId, end: RunEnd) {
        let mut node = std::mem::replace(&mut self.current_node, HistoryNode::start(next));
        node.ended_by = end;
        self.interleavings.push(node);
        self.visit_counts.clear();
        self.history.clear();
        if let Some(replay) = &mut self.replay {
            replay.on_switch();
        } else {
            self.cursor.on_switch(&self.tracking, next);
        }
    }

    /// Finalizes and returns the invocation's interleaving history.
    pub(crate) fn finish(&mut self) -> Vec<HistoryNode> {
        let worker = self.current_node.worker;
        let node = std::mem::replace(&mut self.current_node, HistoryNode::start(worker));
        self.interleavings.push(node);
        std::mem::take(&mut self.interleavings)
    }

    /// Releases the tracking set back to the driver.
    pub(crate) fn take_tracking(&mut self) -> CycleTrackingSet {
        std::mem::take(&mut self.tracking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn detector(threshold: usize, extra: bool) -> LoopDetector {
        LoopDetector::new(
            threshold,
            1_000,
            extra,
            CycleTrackingSet::new(),
            None,
            WorkerId(0),
        )
    }

    #[test]
    fn below_threshold_is_quiet() {
        init_test_logging();
        let mut det = detector(3, false);
        let cl = CodeLocation(8);
        for _ in 0..3 {
            assert_eq!(det.visit(cl), Visit::NONE);
        }
    }

    #[test]
    fn threshold_boundary_is_exact() {
        init_test_logging();
        crate::test_phase!("threshold_boundary_is_exact");
        let mut det = detector(3, false);
        let cl = CodeLocation(8);
        // Visits 1..=3 stay quiet; visit 4 (count > threshold) fires.
        det.visit(cl);
        det.visit(cl);
        let at_threshold = det.visit(cl);
        assert!(at_threshold.sudden.is_none());
        assert!(!at_threshold.must_switch);
        let over = det.visit(cl);
        assert_eq!(over.sudden, Some(DetectorSudden::FirstDetection));
        crate::test_complete!("threshold_boundary_is_exact");
    }

    #[test]
    fn sentinel_never_counts() {
        init_test_logging();
        let mut det = detector(2, false);
        for _ in 0..100 {
            assert_eq!(det.visit(CodeLocation::SUSPENSION), Visit::NONE);
        }
        assert_eq!(det.total_executions(), 0);
    }

    #[test]
    fn measuring_pass_identifies_period() {
        init_test_logging();
        crate::test_phase!("measuring_pass_identifies_period");
        let mut det = detector(3, true);
        let a = CodeLocation(8);
        let b = CodeLocation(10);
        let mut sudden = None;
        for _ in 0..10 {
            let visit_a = det.visit(a);
            if visit_a.sudden.is_some() {
                sudden = visit_a.sudden;
                break;
            }
            let visit_b = det.visit(b);
            if visit_b.sudden.is_some() {
                sudden = visit_b.sudden;
                break;
            }
        }
        assert_eq!(sudden, Some(DetectorSudden::PeriodMeasured));
        let history = det.finish();
        let node = &history[0];
        assert!(node.cycle_detected);
        assert_eq!(node.spin_cycle_period, 2);
        assert_eq!(node.executions, 0, "pure cycle has no lead-in");
        assert_eq!(node.execution_hash, fold_hash(fold_hash(0, a), b));
        crate::test_complete!("measuring_pass_identifies_period");
    }

    #[test]
    fn early_detection_switches_after_one_period() {
        init_test_logging();
        crate::test_phase!("early_detection_switches_after_one_period");
        let a = CodeLocation(8);
        let b = CodeLocation(10);
        let mut tracking = CycleTrackingSet::new();
        tracking.add_interleaving(&[HistoryNode {
            spin_cycle_period: 2,
            spin_cycle_period_with_extra: 2,
            execution_hash: fold_hash(fold_hash(0, a), b),
            cycle_detected: true,
            ended_by: RunEnd::ActiveLock,
            ..HistoryNode::start(WorkerId(0))
        }]);
        let mut det = LoopDetector::new(10, 1_000, true, tracking, None, WorkerId(0));
        // One full period suffices; no need for 10 visits per location.
        let first = det.visit(a);
        assert!(!first.must_switch);
        let second = det.visit(b);
        assert!(second.must_switch, "known cycle recognized early");
        assert!(second.spin);
        // Amortized cost charged to the livelock budget.
        assert_eq!(det.total_executions(), 2 + 10);
        crate::test_complete!("early_detection_switches_after_one_period");
    }

    #[test]
    fn livelock_ceiling_escalates() {
        init_test_logging();
        // Ceiling of 4: three visits stay under it, so the per-location
        // threshold fires as a first detection.
        let mut det =
            LoopDetector::new(2, 4, false, CycleTrackingSet::new(), None, WorkerId(0));
        let cl = CodeLocation(8);
        det.visit(cl);
        det.visit(cl);
        assert_eq!(det.visit(cl).sudden, Some(DetectorSudden::FirstDetection));

        // Ceiling of 2: the same third visit pushes the total to 3 > 2 and
        // the detection escalates to a livelock verdict.
        let mut det =
            LoopDetector::new(2, 2, false, CycleTrackingSet::new(), None, WorkerId(0));
        det.visit(cl);
        det.visit(cl);
        assert_eq!(det.visit(cl).sudden, Some(DetectorSudden::Livelock));
    }

    #[test]
    fn switch_clears_visit_counts() {
        init_test_logging();
        let mut det = detector(2, false);
        let cl = CodeLocation(8);
        det.visit(cl);
        det.visit(cl);
        det.on_switch(WorkerId(1), RunEnd::Strategy);
        // Counts were cleared: two more visits stay quiet.
        assert_eq!(det.visit(cl), Visit::NONE);
        assert_eq!(det.visit(cl), Visit::NONE);
    }

    #[test]
    fn finish_produces_one_node_per_run() {
        init_test_logging();
        let mut det = detector(10, false);
        det.visit(CodeLocation(8));
        det.on_switch(WorkerId(1), RunEnd::Strategy);
        det.visit(CodeLocation(10));
        det.visit(CodeLocation(12));
        let history = det.finish();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].worker, WorkerId(0));
        assert_eq!(history[0].executions, 1);
        assert_eq!(history[1].worker, WorkerId(1));
        assert_eq!(history[1].executions, 2);
    }

    #[test]
    fn replay_mode_follows_recording() {
        init_test_logging();
        // Both runs were cut by strategy switches, so replay advises their
        // boundaries at the recorded counts.
        let history = vec![
            HistoryNode {
                ended_by: RunEnd::Strategy,
                executions: 2,
                executions_with_extra_events: 2,
                ..HistoryNode::start(WorkerId(0))
            },
            HistoryNode {
                ended_by: RunEnd::Strategy,
                executions: 1,
                executions_with_extra_events: 1,
                ..HistoryNode::start(WorkerId(1))
            },
        ];
        let replay = ReplayHelper::new(history, false, true);
        let mut det = LoopDetector::new(
            100,
            1_000,
            true,
            CycleTrackingSet::new(),
            Some(replay),
            WorkerId(0),
        );
        assert!(det.is_replaying());
        assert_eq!(det.replay_next_worker(), Some(WorkerId(1)));
        assert!(!det.visit(CodeLocation(8)).must_switch);
        assert!(det.visit(CodeLocation(10)).must_switch);
        det.on_switch(WorkerId(1), RunEnd::Strategy);
        assert!(det.visit(CodeLocation(12)).must_switch);
    }
}

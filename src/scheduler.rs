//! The cooperative baton scheduler.
//!
//! Workers are OS threads, but they run strictly interleaved: exactly one
//! worker at a time holds the *baton* and may advance past a switch point.
//! Inactive workers busy-spin in [`ManagedScheduler::await_turn`], yielding
//! to the OS periodically. The baton is a single atomic written with
//! release ordering by the outgoing worker and read with acquire ordering
//! by every spinner, so ownership of all engine state transfers with it; no
//! other lock discipline is needed, and the internal mutex is uncontended
//! by construction.
//!
//! Forcible termination uses a dedicated panic payload,
//! [`ForcibleFinish`], raised on the current worker after a sudden result
//! is installed. Instrumented code must let it propagate: a catch-all frame
//! that absorbs it is an instrumentation bug, not a way to hide a failure.

use crate::config::StrategyConfig;
use crate::error::Failure;
use crate::monitor::MonitorTracker;
use crate::objects::LocalObjectTracker;
use crate::oracle::SchedulingOracle;
use crate::runner::Continuations;
use crate::spin::{
    CycleTrackingSet, DetectorSudden, HistoryNode, LoopDetector, ReplayHelper, RunEnd,
};
use crate::stack::CallStackTracker;
use crate::trace::{SwitchReason, TraceCollector, TraceEntry, TracePoint, TracePointKind};
use crate::types::{ActorId, ActorValue, CodeLocation, ObjectRef, WorkerId};
use parking_lot::{Condvar, Mutex, MutexGuard};
use smallvec::SmallVec;
use std::panic::panic_any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Busy-wait iterations between OS yields in [`ManagedScheduler::await_turn`].
pub const SPIN_BEFORE_YIELD: u32 = 100_000;

/// The forcible-finish signal.
///
/// Raised as a panic payload on a worker whose invocation is being aborted.
/// It must bubble through every frame to the worker's top; user code is
/// contractually forbidden to absorb it.
#[derive(Debug, Clone, Copy)]
pub struct ForcibleFinish;

/// Static descriptor of one actor, as the scheduler needs it.
#[derive(Debug, Clone)]
pub(crate) struct ActorMeta {
    pub name: String,
    pub blocking: bool,
    pub causes_blocking: bool,
}

/// Sudden invocation results installed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Sudden {
    /// A spin cycle was found for the first time; re-run the same
    /// interleaving with value-view tracking on.
    SpinCycleFirstDetected,
    /// The cycle period was measured; the next attempt can continue past
    /// the cycle via early detection.
    SpinCyclePeriodMeasured,
    /// The invocation failed.
    Failed(Failure),
}

/// Everything mutated only by the baton holder.
pub(crate) struct EngineState {
    pub monitors: MonitorTracker,
    pub detector: LoopDetector,
    pub trace: TraceCollector,
    pub stacks: CallStackTracker,
    pub locals: LocalObjectTracker,
    pub oracle: Box<dyn SchedulingOracle>,
    pub current_actor: Vec<ActorId>,
    pub ignored_depth: Vec<usize>,
    pub sudden: Option<Sudden>,
    pub results: Vec<Vec<ActorValue>>,
}

/// Parameters of one invocation.
pub(crate) struct InvocationSetup {
    pub config: StrategyConfig,
    pub meta: Vec<Vec<ActorMeta>>,
    pub oracle: Box<dyn SchedulingOracle>,
    pub continuations: Arc<dyn Continuations>,
    pub tracking: CycleTrackingSet,
    pub extra_tracking: bool,
    pub replay: Option<ReplayHelper>,
    pub collect_trace: bool,
}

/// What an invocation left behind.
pub(crate) struct InvocationArtifacts {
    pub sudden: Option<Sudden>,
    pub results: Vec<Vec<ActorValue>>,
    pub interleavings: Vec<HistoryNode>,
    pub entries: Vec<TraceEntry>,
    pub tracking: CycleTrackingSet,
}

enum Pick {
    Switched,
    Stay,
    Deadlock,
}

/// The scheduler core: owns the baton and the per-worker flags.
pub struct ManagedScheduler {
    width: usize,
    config: StrategyConfig,
    meta: Vec<Vec<ActorMeta>>,
    continuations: Arc<dyn Continuations>,
    /// The baton: index of the worker allowed to run.
    current: AtomicUsize,
    /// Set when the invocation is being torn down; spinners raise
    /// [`ForcibleFinish`] when they observe it.
    abort: AtomicBool,
    finished: Vec<AtomicBool>,
    suspended: Vec<AtomicBool>,
    state: Mutex<EngineState>,
    exited: Mutex<usize>,
    exited_cv: Condvar,
}

impl ManagedScheduler {
    pub(crate) fn new(setup: InvocationSetup) -> Arc<Self> {
        let width = setup.meta.len();
        let detector = LoopDetector::new(
            setup.config.hanging_detection_threshold,
            setup.config.livelock_events_threshold,
            setup.extra_tracking,
            setup.tracking,
            setup.replay,
            WorkerId(0),
        );
        let state = EngineState {
            monitors: MonitorTracker::new(width),
            detector,
            trace: TraceCollector::new(setup.collect_trace),
            stacks: CallStackTracker::new(width),
            locals: LocalObjectTracker::new(),
            oracle: setup.oracle,
            current_actor: vec![0; width],
            ignored_depth: vec![0; width],
            sudden: None,
            results: vec![Vec::new(); width],
        };
        Arc::new(Self {
            width,
            config: setup.config,
            meta: setup.meta,
            continuations: setup.continuations,
            current: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
            finished: (0..width).map(|_| AtomicBool::new(false)).collect(),
            suspended: (0..width).map(|_| AtomicBool::new(false)).collect(),
            state: Mutex::new(state),
            exited: Mutex::new(0),
            exited_cv: Condvar::new(),
        })
    }

    /// Parallel width of the scenario.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// True when local-object elimination is configured on.
    pub(crate) fn eliminates_local_objects(&self) -> bool {
        self.config.eliminate_local_objects
    }

    fn is_worker(&self, worker: WorkerId) -> bool {
        worker.index() < self.width
    }

    fn in_ignored_section(&self, worker: WorkerId) -> bool {
        self.state.lock().ignored_depth[worker.index()] > 0
    }

    /// Raises the forcible-finish signal when the invocation is aborting.
    fn check_abort(&self) {
        if self.abort.load(Ordering::Acquire) {
            panic_any(ForcibleFinish);
        }
    }

    /// Busy-waits until `worker` holds the baton.
    ///
    /// Issues an OS yield every [`SPIN_BEFORE_YIELD`] iterations and raises
    /// [`ForcibleFinish`] when the invocation is aborting.
    pub(crate) fn await_turn(&self, worker: WorkerId) {
        let mut spins: u32 = 0;
        loop {
            if self.abort.load(Ordering::Acquire) {
                panic_any(ForcibleFinish);
            }
            if self.current.load(Ordering::Acquire) == worker.index() {
                return;
            }
            std::hint::spin_loop();
            spins = spins.wrapping_add(1);
            if spins % SPIN_BEFORE_YIELD == 0 {
                std::thread::yield_now();
            }
        }
    }

    /// Installs a sudden result, aborts the invocation, and raises the
    /// forcible-finish signal on the calling worker.
    fn abort_with(&self, mut st: MutexGuard<'_, EngineState>, sudden: Sudden) -> ! {
        if st.sudden.is_none() {
            st.sudden = Some(sudden);
        }
        drop(st);
        self.abort.store(true, Ordering::Release);
        panic_any(ForcibleFinish);
    }

    /// Aborts the invocation from outside the worker pool (wall-clock
    /// budget expiry). Does not panic the caller.
    pub(crate) fn abort_invocation(&self, failure: Failure) {
        let mut st = self.state.lock();
        if st.sudden.is_none() {
            st.sudden = Some(Sudden::Failed(failure));
        }
        drop(st);
        self.abort.store(true, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Worker lifecycle
    // ------------------------------------------------------------------

    /// Called by a worker thread before its first actor.
    pub(crate) fn on_start(&self, worker: WorkerId) {
        self.await_turn(worker);
    }

    /// Called at each actor boundary; the call stack must be empty here.
    pub(crate) fn on_actor_start(&self, worker: WorkerId, actor: ActorId) {
        let mut st = self.state.lock();
        debug_assert!(
            st.stacks.is_empty(worker),
            "call stack not empty at actor boundary"
        );
        st.stacks.clear(worker);
        st.current_actor[worker.index()] = actor;
    }

    /// Records an actor's result value.
    pub(crate) fn on_actor_result(&self, worker: WorkerId, value: ActorValue) {
        let mut st = self.state.lock();
        st.results[worker.index()].push(value);
        if self.config.collect_state_representation && st.trace.is_enabled() {
            self.capture_state(&mut st, worker);
        }
    }

    /// Called by a worker thread after its last actor.
    pub(crate) fn on_finish(&self, worker: WorkerId) {
        self.finished[worker.index()].store(true, Ordering::Release);
        let mut st = self.state.lock();
        debug_assert_eq!(
            st.ignored_depth[worker.index()],
            0,
            "unbalanced ignored section at finish"
        );
        st.trace.finish(worker);
        match self.pick_next(&mut st, worker, true, RunEnd::Finish) {
            Pick::Switched | Pick::Stay => drop(st),
            Pick::Deadlock => self.abort_with(st, Sudden::Failed(Failure::Deadlock)),
        }
    }

    /// Converts an unexpected worker panic into a failure.
    pub(crate) fn on_unexpected_panic(&self, worker: WorkerId, message: String) {
        self.finished[worker.index()].store(true, Ordering::Release);
        let mut st = self.state.lock();
        if st.sudden.is_none() {
            st.sudden = Some(Sudden::Failed(Failure::UnexpectedException { message }));
        }
        drop(st);
        self.abort.store(true, Ordering::Release);
    }

    /// Marks a worker as finished after a forcible finish, so it is never
    /// selected again.
    pub(crate) fn on_forced_finish(&self, worker: WorkerId) {
        self.finished[worker.index()].store(true, Ordering::Release);
    }

    /// Counts a worker thread's exit; wakes the driver.
    pub(crate) fn worker_exited(&self) {
        let mut exited = self.exited.lock();
        *exited += 1;
        self.exited_cv.notify_all();
    }

    /// Blocks the driver until all workers exited or the budget expires.
    ///
    /// Returns `false` on expiry.
    pub(crate) fn wait_for_workers(&self, timeout: Duration) -> bool {
        let mut exited = self.exited.lock();
        while *exited < self.width {
            if self
                .exited_cv
                .wait_for(&mut exited, timeout)
                .timed_out()
            {
                return *exited >= self.width;
            }
        }
        true
    }

    /// Extracts the invocation's artifacts. Call after all workers exited.
    pub(crate) fn take_artifacts(&self) -> InvocationArtifacts {
        let mut st = self.state.lock();
        let interleavings = st.detector.finish();
        let tracking = st.detector.take_tracking();
        InvocationArtifacts {
            sudden: st.sudden.take(),
            results: std::mem::take(&mut st.results),
            interleavings,
            entries: st.trace.take_entries(),
            tracking,
        }
    }

    // ------------------------------------------------------------------
    // Switch points
    // ------------------------------------------------------------------

    /// Intercepts one event.
    ///
    /// `honor_switch` distinguishes genuine switch points from
    /// record-and-count events (helper events, lock releases): the latter
    /// still feed the loop detector, whose sudden verdicts apply anywhere,
    /// but never move the baton by themselves.
    pub(crate) fn intercept(
        &self,
        worker: WorkerId,
        cl: CodeLocation,
        kind: TracePointKind,
        label: &str,
        honor_switch: bool,
    ) {
        if !self.is_worker(worker) {
            return;
        }
        self.check_abort();
        let mut st = self.state.lock();
        if st.ignored_depth[worker.index()] > 0 || st.sudden.is_some() {
            return;
        }
        let visit = st.detector.visit(cl);

        if let Some(sudden) = visit.sudden {
            self.handle_detector_sudden(st, worker, sudden);
        }

        if visit.entered_cycle && st.trace.is_enabled() {
            let actor = st.current_actor[worker.index()];
            let stack = stack_labels(&st, worker);
            st.trace
                .spin_cycle_start(worker, actor, stack, kind == TracePointKind::MethodCall);
        }

        if honor_switch {
            let spin_switch = visit.must_switch && visit.spin;
            let plain_switch = if st.detector.is_replaying() {
                visit.must_switch && !visit.spin
            } else {
                !visit.must_switch && st.oracle.should_switch(worker)
            };
            if spin_switch {
                if self.config.check_obstruction_freedom && !self.blocking_expected(&st, worker)
                {
                    self.obstruction_violation(st, worker, "spin");
                }
                // The event completing the cycle belongs inside it: record
                // it before the active-lock switch.
                self.record_point(&mut st, worker, cl, kind, label);
                let depth = st.stacks.depth(worker);
                let recursive = st.trace.end_spin_run(depth);
                let reason = if recursive {
                    SwitchReason::ActiveLockRecursive
                } else {
                    SwitchReason::ActiveLock
                };
                self.switch_from(st, worker, reason, true);
                return;
            }
            if plain_switch {
                let must = st.detector.is_replaying();
                self.switch_from(st, worker, SwitchReason::Strategy, must);
                st = self.state.lock();
            }
        }

        // Record the event once the worker owns the baton again.
        self.record_point(&mut st, worker, cl, kind, label);
    }

    fn record_point(
        &self,
        st: &mut EngineState,
        worker: WorkerId,
        cl: CodeLocation,
        kind: TracePointKind,
        label: &str,
    ) {
        if !st.trace.is_enabled() {
            return;
        }
        let actor = st.current_actor[worker.index()];
        let stack = stack_labels(st, worker);
        let point = TracePoint {
            worker,
            actor,
            cl,
            kind,
            label: label.to_string(),
            value: None,
        };
        st.trace.code_location(point, stack);
        if matches!(kind, TracePointKind::Write | TracePointKind::AtomicCall)
            && self.config.collect_state_representation
        {
            self.capture_state(st, worker);
        }
    }

    /// Feeds receiver/parameter value views to the loop detector.
    ///
    /// Views are pseudo-events: they enrich cycle identification but are
    /// never recorded in the trace. In replay mode the recorded switch can
    /// land on a view, so switch advice is still honored here.
    pub(crate) fn observe_value_views(&self, worker: WorkerId, views: &[CodeLocation]) {
        if !self.is_worker(worker) {
            return;
        }
        for &view in views {
            debug_assert!(view.is_value_view(), "expected a value view");
            self.observe_view(worker, view);
        }
    }

    fn observe_view(&self, worker: WorkerId, view: CodeLocation) {
        self.check_abort();
        let mut st = self.state.lock();
        if st.ignored_depth[worker.index()] > 0 || st.sudden.is_some() {
            return;
        }
        let visit = st.detector.visit(view);
        if let Some(sudden) = visit.sudden {
            self.handle_detector_sudden(st, worker, sudden);
        }
        if visit.entered_cycle && st.trace.is_enabled() {
            let actor = st.current_actor[worker.index()];
            let stack = stack_labels(&st, worker);
            st.trace.spin_cycle_start(worker, actor, stack, false);
        }
        if visit.must_switch {
            let reason = if visit.spin {
                let depth = st.stacks.depth(worker);
                if st.trace.end_spin_run(depth) {
                    SwitchReason::ActiveLockRecursive
                } else {
                    SwitchReason::ActiveLock
                }
            } else {
                SwitchReason::Strategy
            };
            self.switch_from(st, worker, reason, true);
        }
    }

    fn handle_detector_sudden(
        &self,
        st: MutexGuard<'_, EngineState>,
        worker: WorkerId,
        sudden: DetectorSudden,
    ) -> ! {
        // A measured spin in a non-blocking actor is an obstruction-freedom
        // violation. First detections restart for measurement first, so the
        // violation surfaces with a replayable cycle in the history.
        if matches!(
            sudden,
            DetectorSudden::PeriodMeasured | DetectorSudden::Livelock
        ) && self.config.check_obstruction_freedom
            && !self.blocking_expected(&st, worker)
        {
            self.obstruction_violation(st, worker, "spin");
        }
        match sudden {
            DetectorSudden::FirstDetection => {
                self.abort_with(st, Sudden::SpinCycleFirstDetected)
            }
            DetectorSudden::PeriodMeasured => {
                self.abort_with(st, Sudden::SpinCyclePeriodMeasured)
            }
            DetectorSudden::Livelock => {
                self.abort_with(st, Sudden::Failed(Failure::LivelockThresholdExceeded))
            }
            DetectorSudden::ReplayDeadlock => {
                self.abort_with(st, Sudden::Failed(Failure::Deadlock))
            }
        }
    }

    fn obstruction_violation(
        &self,
        mut st: MutexGuard<'_, EngineState>,
        worker: WorkerId,
        blocked_on: &'static str,
    ) -> ! {
        let actor = st.current_actor[worker.index()];
        let stack = stack_labels(&st, worker);
        st.trace.obstruction_freedom_abort(worker, actor, stack);
        self.abort_with(
            st,
            Sudden::Failed(Failure::ObstructionFreedomViolation { blocked_on }),
        )
    }

    /// True when blocking is legitimate right now: the current actor is
    /// declared blocking, or some running actor may cause blocking.
    fn blocking_expected(&self, st: &EngineState, worker: WorkerId) -> bool {
        let own = self.meta[worker.index()]
            .get(st.current_actor[worker.index()])
            .is_some_and(|meta| meta.blocking);
        if own {
            return true;
        }
        (0..self.width).any(|i| {
            !self.finished[i].load(Ordering::Acquire)
                && self.meta[i]
                    .get(st.current_actor[i])
                    .is_some_and(|meta| meta.causes_blocking)
        })
    }

    /// Records the switch, hands the baton over, and waits to be scheduled
    /// again.
    fn switch_from(
        &self,
        mut st: MutexGuard<'_, EngineState>,
        worker: WorkerId,
        reason: SwitchReason,
        must: bool,
    ) {
        let actor = st.current_actor[worker.index()];
        let stack = stack_labels(&st, worker);
        st.trace.switch(worker, actor, reason, stack);
        let end = match reason {
            SwitchReason::Strategy => RunEnd::Strategy,
            SwitchReason::ActiveLock | SwitchReason::ActiveLockRecursive => RunEnd::ActiveLock,
            SwitchReason::LockWait | SwitchReason::MonitorWait | SwitchReason::Suspended => {
                RunEnd::Semantic
            }
        };
        match self.pick_next(&mut st, worker, must, end) {
            Pick::Switched => {
                drop(st);
                self.await_turn(worker);
            }
            Pick::Stay => drop(st),
            Pick::Deadlock => self.abort_with(st, Sudden::Failed(Failure::Deadlock)),
        }
    }

    /// Selects the next worker per the candidate rule.
    fn pick_next(
        &self,
        st: &mut EngineState,
        worker: WorkerId,
        must: bool,
        end: RunEnd,
    ) -> Pick {
        let candidates: SmallVec<[WorkerId; 8]> = (0..self.width)
            .filter(|&i| i != worker.index())
            .map(WorkerId)
            .filter(|&w| self.is_active(st, w))
            .collect();

        if candidates.is_empty() {
            let any_unfinished = (0..self.width).any(|i| !self.finished[i].load(Ordering::Acquire));
            if must && any_unfinished {
                // Run a suspended coroutine to completion if one exists.
                let drainable = (0..self.width).find(|&i| {
                    i != worker.index()
                        && !self.finished[i].load(Ordering::Acquire)
                        && self.suspended[i].load(Ordering::Acquire)
                });
                if let Some(next) = drainable {
                    st.detector.on_switch(WorkerId(next), end);
                    self.current.store(next, Ordering::Release);
                    return Pick::Switched;
                }
                return Pick::Deadlock;
            }
            return Pick::Stay;
        }

        let next = if st.detector.is_replaying() {
            match st.detector.replay_next_worker() {
                Some(recorded) if candidates.contains(&recorded) => recorded,
                _ => candidates[0],
            }
        } else {
            st.oracle.choose_next(worker, &candidates)
        };
        st.detector.on_switch(next, end);
        self.current.store(next.index(), Ordering::Release);
        Pick::Switched
    }

    fn is_active(&self, st: &EngineState, worker: WorkerId) -> bool {
        let i = worker.index();
        !self.finished[i].load(Ordering::Acquire)
            && !st.monitors.is_waiting(worker)
            && (!self.suspended[i].load(Ordering::Acquire)
                || self
                    .continuations
                    .is_resumed(worker, st.current_actor[i]))
    }

    // ------------------------------------------------------------------
    // Monitor operations
    // ------------------------------------------------------------------

    /// Lock acquisition: a switch point, then an acquire loop where every
    /// failure forces another switch.
    pub(crate) fn acquire_monitor(
        &self,
        worker: WorkerId,
        cl: CodeLocation,
        label: &str,
        monitor: ObjectRef,
    ) {
        if !self.is_worker(worker) || self.in_ignored_section(worker) {
            return;
        }
        self.intercept(worker, cl, TracePointKind::MonitorEnter, label, true);
        loop {
            self.check_abort();
            let mut st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            if self.config.check_obstruction_freedom && !self.blocking_expected(&st, worker) {
                self.obstruction_violation(st, worker, "lock");
            }
            if st.monitors.acquire(worker, monitor) {
                return;
            }
            self.switch_from(st, worker, SwitchReason::LockWait, true);
        }
    }

    /// Lock release: record only, never a switch point.
    pub(crate) fn release_monitor(
        &self,
        worker: WorkerId,
        cl: CodeLocation,
        label: &str,
        monitor: ObjectRef,
    ) {
        if !self.is_worker(worker) || self.in_ignored_section(worker) {
            return;
        }
        self.check_abort();
        {
            let mut st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            if let Err(err) = st.monitors.release(monitor) {
                self.abort_with(st, Sudden::Failed(err.into()));
            }
        }
        self.intercept(worker, cl, TracePointKind::MonitorExit, label, false);
    }

    /// Monitor wait: a switch point, then a wait loop driven by the
    /// tracker; timed waits return immediately as a permitted wakeup.
    pub(crate) fn wait_monitor(
        &self,
        worker: WorkerId,
        cl: CodeLocation,
        label: &str,
        monitor: ObjectRef,
        timed: bool,
    ) {
        if !self.is_worker(worker) || self.in_ignored_section(worker) {
            return;
        }
        self.intercept(worker, cl, TracePointKind::Wait, label, true);
        {
            let st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            if self.config.check_obstruction_freedom && !self.blocking_expected(&st, worker) {
                self.obstruction_violation(st, worker, "wait");
            }
        }
        if timed {
            return;
        }
        loop {
            self.check_abort();
            let mut st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            match st.monitors.wait_on(worker, monitor) {
                Err(err) => self.abort_with(st, Sudden::Failed(err.into())),
                Ok(false) => return,
                Ok(true) => self.switch_from(st, worker, SwitchReason::MonitorWait, true),
            }
        }
    }

    /// Monitor notification: delegate to the tracker and record.
    pub(crate) fn notify_monitor(
        &self,
        worker: WorkerId,
        cl: CodeLocation,
        label: &str,
        monitor: ObjectRef,
    ) {
        if !self.is_worker(worker) || self.in_ignored_section(worker) {
            return;
        }
        self.check_abort();
        {
            let mut st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            st.monitors.notify(monitor);
        }
        self.intercept(worker, cl, TracePointKind::Notify, label, false);
    }

    // ------------------------------------------------------------------
    // Suspension
    // ------------------------------------------------------------------

    /// A worker's continuation suspended.
    ///
    /// When the runner reports the continuation as resumable, a synthetic
    /// switch point with the reserved sentinel is recorded; otherwise the
    /// scheduler forces a `Suspended` switch and the worker is re-selected
    /// only once resumable.
    pub(crate) fn after_suspension(&self, worker: WorkerId) {
        if !self.is_worker(worker) {
            return;
        }
        self.suspended[worker.index()].store(true, Ordering::Release);
        let resumable = {
            let st = self.state.lock();
            self.continuations
                .is_resumed(worker, st.current_actor[worker.index()])
        };
        if resumable {
            self.intercept(
                worker,
                CodeLocation::SUSPENSION,
                TracePointKind::Suspension,
                "suspension",
                true,
            );
        } else {
            self.check_abort();
            let st = self.state.lock();
            if st.sudden.is_some() {
                return;
            }
            self.switch_from(st, worker, SwitchReason::Suspended, true);
        }
    }

    /// The worker's continuation resumes.
    pub(crate) fn before_resumption(&self, worker: WorkerId) {
        if !self.is_worker(worker) {
            return;
        }
        self.check_abort();
        self.suspended[worker.index()].store(false, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Small state accessors for the events surface
    // ------------------------------------------------------------------

    pub(crate) fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock()
    }

    pub(crate) fn capture_state(&self, st: &mut EngineState, worker: WorkerId) {
        // The capture callback runs user code; shield it from re-entry.
        st.ignored_depth[worker.index()] += 1;
        let snapshot = self.continuations.capture_state_representation();
        st.ignored_depth[worker.index()] -= 1;
        if let Some(snapshot) = snapshot {
            let actor = st.current_actor[worker.index()];
            st.trace.state_representation(worker, actor, snapshot);
        }
    }
}

/// Labels of a worker's call stack, outermost first.
pub(crate) fn stack_labels(st: &EngineState, worker: WorkerId) -> Vec<String> {
    st.stacks
        .snapshot(worker)
        .iter()
        .map(|frame| frame.label.clone())
        .collect()
}

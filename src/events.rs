//! The event interception surface.
//!
//! Instrumented user code calls these methods to report every shared read,
//! write, atomic call, lock operation, park, wait, and method call. Each
//! call translates the event into scheduler and tracker updates; switch
//! points additionally give the scheduler the opportunity to move the
//! baton. All methods are no-ops when the handle does not belong to a live
//! scenario worker.
//!
//! The handle is cheap to clone and is passed to each actor body; its
//! embedded worker id is what attributes events to workers, so no
//! thread-local state is involved.

use crate::scheduler::ManagedScheduler;
use crate::trace::TracePointKind;
use crate::types::{CodeLocation, ObjectRef, WorkerId};
use std::sync::Arc;

/// One worker's interception handle.
#[derive(Clone)]
pub struct WorkerHandle {
    scheduler: Arc<ManagedScheduler>,
    worker: WorkerId,
}

impl WorkerHandle {
    pub(crate) fn new(scheduler: Arc<ManagedScheduler>, worker: WorkerId) -> Self {
        Self { scheduler, worker }
    }

    /// The worker this handle reports for.
    #[must_use]
    pub const fn worker(&self) -> WorkerId {
        self.worker
    }

    /// A shared read is about to execute. Switch point.
    pub fn before_read(&self, cl: CodeLocation, label: &str) {
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::Read, label, true);
    }

    /// A read of a tracked object is about to execute. Switch point unless
    /// the object is still local to this worker.
    pub fn before_read_object(&self, cl: CodeLocation, label: &str, object: ObjectRef) {
        if self.is_eliminated(object) {
            return;
        }
        self.before_read(cl, label);
    }

    /// Attaches the value produced by the read to the trace.
    pub fn after_read(&self, value: &str) {
        let mut st = self.scheduler.state();
        if st.ignored_depth[self.worker.index()] > 0 {
            return;
        }
        st.trace.attach_value(value.to_string());
    }

    /// A shared write is about to execute. Switch point.
    pub fn before_write(&self, cl: CodeLocation, label: &str) {
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::Write, label, true);
    }

    /// A write of `value` into a field of `target` is about to execute.
    ///
    /// Updates locality: a store into a local target keeps `value` local, a
    /// store into a shared target publishes it. Switch point unless the
    /// target is still local.
    pub fn before_write_object(
        &self,
        cl: CodeLocation,
        label: &str,
        target: ObjectRef,
        value: Option<ObjectRef>,
    ) {
        let local = {
            let mut st = self.scheduler.state();
            if st.ignored_depth[self.worker.index()] > 0 {
                return;
            }
            if let Some(value) = value {
                st.locals.on_field_write(target, value);
            }
            st.locals.is_local(target)
        };
        if local && self.eliminate_locals() {
            return;
        }
        self.before_write(cl, label);
    }

    /// An atomic method call is about to execute. Switch point; the trace
    /// point reuses the label of the innermost tracked method call.
    pub fn before_atomic_call(&self, cl: CodeLocation) {
        let label = {
            let st = self.scheduler.state();
            st.stacks
                .snapshot(self.worker)
                .last()
                .map_or_else(|| "atomic".to_string(), |frame| frame.label.clone())
        };
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::AtomicCall, &label, true);
    }

    /// A monitor acquisition is about to execute. Switch point, then the
    /// acquire loop: every failed attempt forces another switch.
    pub fn before_lock_acquire(&self, cl: CodeLocation, label: &str, monitor: ObjectRef) {
        self.scheduler
            .acquire_monitor(self.worker, cl, label, monitor);
    }

    /// A monitor release is about to execute. Recorded, never a switch
    /// point.
    pub fn before_lock_release(&self, cl: CodeLocation, label: &str, monitor: ObjectRef) {
        self.scheduler
            .release_monitor(self.worker, cl, label, monitor);
    }

    /// A park is about to execute. Switch point; timed parks return
    /// immediately, and untimed parks are permitted spurious wakeups, so
    /// neither blocks the cooperative loop.
    pub fn before_park(&self, cl: CodeLocation, label: &str, _timed: bool) {
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::Park, label, true);
    }

    /// An unpark executed. Recorded; the wakeup itself is handled through
    /// worker reactivation.
    pub fn after_unpark(&self, cl: CodeLocation, label: &str) {
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::Unpark, label, false);
    }

    /// A monitor wait is about to execute. Switch point, then the wait loop
    /// driven by the monitor tracker; a timed wait returns immediately as a
    /// permitted wakeup.
    pub fn before_wait(&self, cl: CodeLocation, label: &str, monitor: ObjectRef, timed: bool) {
        self.scheduler
            .wait_monitor(self.worker, cl, label, monitor, timed);
    }

    /// A notify is about to execute. Wakes all waiters (wake-one is
    /// deliberately over-approximated) and records the event.
    pub fn before_notify(&self, cl: CodeLocation, label: &str, monitor: ObjectRef, _all: bool) {
        self.scheduler
            .notify_monitor(self.worker, cl, label, monitor);
    }

    /// A tracked method call begins.
    ///
    /// `views` are value views of the receiver and parameters
    /// (see [`CodeLocation::value_view`]); they enrich spin-cycle
    /// identification on measuring passes.
    pub fn before_method_call(&self, cl: CodeLocation, label: &str, views: &[CodeLocation]) {
        if self.in_ignored_section() {
            return;
        }
        self.scheduler.observe_value_views(self.worker, views);
        self.scheduler
            .state()
            .stacks
            .push(self.worker, label.to_string());
        self.scheduler
            .intercept(self.worker, cl, TracePointKind::MethodCall, label, false);
    }

    /// The innermost tracked method call ends.
    ///
    /// When the call suspended instead of returning, its method identity is
    /// preserved for the resumption.
    pub fn after_method_call(&self, suspended: bool) {
        if self.in_ignored_section() {
            return;
        }
        self.scheduler.state().stacks.pop(self.worker, suspended);
    }

    /// Enters an ignored section: nested instrumentation calls become
    /// no-ops until the matching leave.
    pub fn enter_ignored_section(&self) {
        self.scheduler.state().ignored_depth[self.worker.index()] += 1;
    }

    /// Leaves an ignored section.
    pub fn leave_ignored_section(&self) {
        let mut st = self.scheduler.state();
        let depth = &mut st.ignored_depth[self.worker.index()];
        debug_assert!(*depth > 0, "unbalanced ignored section");
        *depth = depth.saturating_sub(1);
    }

    /// A new object was created; accesses to it are not switch points
    /// until it is published to shared state.
    pub fn new_object_creation(&self, object: ObjectRef) {
        let mut st = self.scheduler.state();
        if st.ignored_depth[self.worker.index()] > 0 {
            return;
        }
        st.locals.register(object);
    }

    /// The current actor's continuation suspended.
    pub fn after_coroutine_suspended(&self) {
        self.scheduler.after_suspension(self.worker);
    }

    /// The current actor's continuation resumes.
    pub fn before_coroutine_resumed(&self) {
        self.scheduler.before_resumption(self.worker);
    }

    fn eliminate_locals(&self) -> bool {
        self.scheduler.eliminates_local_objects()
    }

    fn is_eliminated(&self, object: ObjectRef) -> bool {
        self.eliminate_locals() && self.scheduler.state().locals.is_local(object)
    }

    fn in_ignored_section(&self) -> bool {
        self.scheduler.state().ignored_depth[self.worker.index()] > 0
    }
}

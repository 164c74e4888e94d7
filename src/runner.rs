//! The runner seam: continuation resumption and state capture.
//!
//! The engine does not know how user continuations are implemented; it only
//! asks whether a suspended worker's continuation can be resumed, and
//! optionally for a textual snapshot of the data structure state. The
//! default implementation suits scenarios without suspension.

use crate::types::{ActorId, WorkerId};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Resumption and state-capture contract provided by the runner.
pub trait Continuations: Send + Sync {
    /// True when the suspended actor's continuation can be resumed.
    fn is_resumed(&self, worker: WorkerId, actor: ActorId) -> bool {
        let _ = (worker, actor);
        false
    }

    /// Captures a textual snapshot of the data structure state.
    fn capture_state_representation(&self) -> Option<String> {
        None
    }
}

/// Default runner: no suspension, no state capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSuspensions;

impl Continuations for NoSuspensions {}

/// A runner whose resumption flags are raised by the scenario itself.
///
/// Actors that resume other workers call [`ResumeLatch::resume`]; the
/// scheduler then considers the suspended worker active again.
#[derive(Debug, Default)]
pub struct ResumeLatch {
    resumed: Mutex<HashSet<(usize, usize)>>,
}

impl ResumeLatch {
    /// Creates a latch with no resumptions recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the actor's continuation as resumable.
    pub fn resume(&self, worker: WorkerId, actor: ActorId) {
        self.resumed.lock().insert((worker.index(), actor));
    }
}

impl Continuations for ResumeLatch {
    fn is_resumed(&self, worker: WorkerId, actor: ActorId) -> bool {
        self.resumed.lock().contains(&(worker.index(), actor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    #[test]
    fn default_runner_never_resumes() {
        init_test_logging();
        let runner = NoSuspensions;
        assert!(!runner.is_resumed(WorkerId(0), 0));
        assert!(runner.capture_state_representation().is_none());
    }

    #[test]
    fn latch_resumes_exactly_the_marked_actor() {
        init_test_logging();
        let latch = ResumeLatch::new();
        assert!(!latch.is_resumed(WorkerId(0), 1));
        latch.resume(WorkerId(0), 1);
        assert!(latch.is_resumed(WorkerId(0), 1));
        assert!(!latch.is_resumed(WorkerId(1), 1));
    }
}

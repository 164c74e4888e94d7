//! Deterministic semantics for mutual-exclusion monitors.
//!
//! The tracker gives acquire / release / wait / notify over opaque monitor
//! identities a semantics the strategy can reproduce exactly on replay.
//! Fairness and wake-one delivery are deliberately over-approximated:
//! `notify` behaves as `notify_all`, and the strategy is permitted to
//! introduce spurious wakeups. Users must never observe monitor behavior
//! the replay pass cannot reproduce.
//!
//! All tables are touched only by the worker currently holding the baton,
//! so the tracker itself needs no synchronization.

use crate::error::MonitorError;
use crate::types::{ObjectRef, WorkerId};
use crate::util::DetHashMap;
use std::fmt;

/// One acquisition record: owner and reentrancy depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Acquisition {
    owner: WorkerId,
    reentrancy: usize,
}

/// Tracks monitor ownership, waiters, and parked reentrancy.
#[derive(Debug)]
pub struct MonitorTracker {
    /// Currently held monitors. An entry exists iff reentrancy >= 1.
    acquired: DetHashMap<ObjectRef, Acquisition>,
    /// The monitor each worker is blocked on, if any.
    waiting: Vec<Option<ObjectRef>>,
    /// Whether the blocked worker additionally awaits a notification.
    awaiting_notify: Vec<bool>,
    /// Reentrancy saved across `wait`, keyed by (worker, monitor).
    park_slots: DetHashMap<(usize, ObjectRef), usize>,
}

impl MonitorTracker {
    /// Creates a tracker for `width` workers.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            acquired: DetHashMap::default(),
            waiting: vec![None; width],
            awaiting_notify: vec![false; width],
            park_slots: DetHashMap::default(),
        }
    }

    /// Attempts to acquire `monitor` for `worker`.
    ///
    /// Returns `true` on success (first acquisition or reentrant), `false`
    /// when the monitor is owned by another worker; in that case the worker
    /// is recorded as waiting and the caller must switch.
    pub fn acquire(&mut self, worker: WorkerId, monitor: ObjectRef) -> bool {
        match self.acquired.get_mut(&monitor) {
            None => {
                self.acquired.insert(
                    monitor,
                    Acquisition {
                        owner: worker,
                        reentrancy: 1,
                    },
                );
                self.waiting[worker.index()] = None;
                true
            }
            Some(acq) if acq.owner == worker => {
                acq.reentrancy += 1;
                true
            }
            Some(_) => {
                self.waiting[worker.index()] = Some(monitor);
                false
            }
        }
    }

    /// Releases one level of `monitor`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvalidRelease`] when the monitor is not
    /// acquired; an unbalanced release is an instrumentation bug.
    pub fn release(&mut self, monitor: ObjectRef) -> Result<(), MonitorError> {
        let Some(acq) = self.acquired.get_mut(&monitor) else {
            return Err(MonitorError::InvalidRelease {
                monitor: monitor.to_string(),
            });
        };
        acq.reentrancy -= 1;
        if acq.reentrancy == 0 {
            self.acquired.remove(&monitor);
        }
        Ok(())
    }

    /// True iff `worker` is blocked: it waits on a monitor that is either
    /// notification-gated or still owned by another worker.
    #[must_use]
    pub fn is_waiting(&self, worker: WorkerId) -> bool {
        let Some(monitor) = self.waiting[worker.index()] else {
            return false;
        };
        self.awaiting_notify[worker.index()]
            || self
                .acquired
                .get(&monitor)
                .is_some_and(|acq| acq.owner != worker)
    }

    /// Drives one step of `wait` for `worker` on `monitor`.
    ///
    /// Returns `true` while the worker must remain blocked (the caller
    /// switches and retries), `false` once the monitor was reacquired at
    /// the original reentrancy.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::InvariantViolation`] when the worker neither
    /// owns the monitor nor holds a park slot for it.
    pub fn wait_on(&mut self, worker: WorkerId, monitor: ObjectRef) -> Result<bool, MonitorError> {
        let key = (worker.index(), monitor);
        match self.acquired.get(&monitor) {
            Some(acq) if acq.owner != worker => Ok(true),
            Some(acq) => {
                // First step: release fully, park the reentrancy, gate on
                // notification.
                self.park_slots.insert(key, acq.reentrancy);
                self.acquired.remove(&monitor);
                self.awaiting_notify[worker.index()] = true;
                self.waiting[worker.index()] = Some(monitor);
                Ok(true)
            }
            None => {
                let Some(reentrancy) = self.park_slots.remove(&key) else {
                    return Err(MonitorError::InvariantViolation {
                        worker: worker.index(),
                        monitor: monitor.to_string(),
                    });
                };
                self.acquired.insert(
                    monitor,
                    Acquisition {
                        owner: worker,
                        reentrancy,
                    },
                );
                self.waiting[worker.index()] = None;
                Ok(false)
            }
        }
    }

    /// Wakes every worker waiting on `monitor`.
    ///
    /// `notify` is modelled as `notify_all`; the scheduling strategy is
    /// free to introduce spurious wakeups on top.
    pub fn notify(&mut self, monitor: ObjectRef) {
        for worker in 0..self.waiting.len() {
            if self.waiting[worker] == Some(monitor) {
                self.awaiting_notify[worker] = false;
            }
        }
    }

    /// Reentrancy of `monitor` as currently held, 0 when unowned.
    #[must_use]
    pub fn reentrancy(&self, monitor: ObjectRef) -> usize {
        self.acquired.get(&monitor).map_or(0, |acq| acq.reentrancy)
    }

    /// Owner of `monitor`, if held.
    #[must_use]
    pub fn owner(&self, monitor: ObjectRef) -> Option<WorkerId> {
        self.acquired.get(&monitor).map(|acq| acq.owner)
    }

}

impl fmt::Display for MonitorTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "monitors held: {}", self.acquired.len())?;
        for (monitor, acq) in &self.acquired {
            writeln!(
                f,
                "  {monitor} owned by {} (reentrancy {})",
                acq.owner, acq.reentrancy
            )?;
        }
        for (worker, monitor) in self.waiting.iter().enumerate() {
            if let Some(monitor) = monitor {
                writeln!(
                    f,
                    "  W{worker} waiting on {monitor}{}",
                    if self.awaiting_notify[worker] {
                        " (awaiting notify)"
                    } else {
                        ""
                    }
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;

    fn monitor(token: usize) -> ObjectRef {
        ObjectRef::from_token(token)
    }

    #[test]
    fn reentrant_acquire_release() {
        init_test_logging();
        crate::test_phase!("reentrant_acquire_release");
        let mut tracker = MonitorTracker::new(2);
        let m = monitor(1);
        assert!(tracker.acquire(WorkerId(0), m));
        assert!(tracker.acquire(WorkerId(0), m));
        assert_eq!(tracker.reentrancy(m), 2);
        // Held between the two releases; the other worker blocks.
        tracker.release(m).unwrap();
        assert_eq!(tracker.reentrancy(m), 1);
        assert!(!tracker.acquire(WorkerId(1), m));
        assert!(tracker.is_waiting(WorkerId(1)));
        tracker.release(m).unwrap();
        assert_eq!(tracker.reentrancy(m), 0);
        assert!(!tracker.is_waiting(WorkerId(1)));
        assert!(tracker.acquire(WorkerId(1), m));
        crate::test_complete!("reentrant_acquire_release");
    }

    #[test]
    fn unbalanced_release_is_invalid() {
        init_test_logging();
        let mut tracker = MonitorTracker::new(1);
        assert!(matches!(
            tracker.release(monitor(9)),
            Err(MonitorError::InvalidRelease { .. })
        ));
    }

    #[test]
    fn wait_parks_and_restores_reentrancy() {
        init_test_logging();
        crate::test_phase!("wait_parks_and_restores_reentrancy");
        let mut tracker = MonitorTracker::new(2);
        let m = monitor(1);
        // Worker 0 holds m at reentrancy 2, then waits.
        assert!(tracker.acquire(WorkerId(0), m));
        assert!(tracker.acquire(WorkerId(0), m));
        assert!(tracker.wait_on(WorkerId(0), m).unwrap());
        assert_eq!(tracker.reentrancy(m), 0);
        assert!(tracker.is_waiting(WorkerId(0)));
        // Worker 1 can take the monitor, notify, release.
        assert!(tracker.acquire(WorkerId(1), m));
        tracker.notify(m);
        // Still blocked: monitor owned by worker 1.
        assert!(tracker.wait_on(WorkerId(0), m).unwrap());
        tracker.release(m).unwrap();
        // Now worker 0 reacquires at its original reentrancy.
        assert!(!tracker.wait_on(WorkerId(0), m).unwrap());
        assert_eq!(tracker.reentrancy(m), 2);
        assert_eq!(tracker.owner(m), Some(WorkerId(0)));
        assert!(!tracker.is_waiting(WorkerId(0)));
        crate::test_complete!("wait_parks_and_restores_reentrancy");
    }

    #[test]
    fn wait_without_ownership_or_park_slot_is_invariant_violation() {
        init_test_logging();
        let mut tracker = MonitorTracker::new(1);
        assert!(matches!(
            tracker.wait_on(WorkerId(0), monitor(3)),
            Err(MonitorError::InvariantViolation { .. })
        ));
    }

    #[test]
    fn notify_wakes_all_waiters() {
        init_test_logging();
        let mut tracker = MonitorTracker::new(3);
        let m = monitor(1);
        assert!(tracker.acquire(WorkerId(0), m));
        assert!(tracker.wait_on(WorkerId(0), m).unwrap());
        assert!(tracker.acquire(WorkerId(1), m));
        assert!(tracker.wait_on(WorkerId(1), m).unwrap());
        assert!(tracker.is_waiting(WorkerId(0)));
        assert!(tracker.is_waiting(WorkerId(1)));
        tracker.notify(m);
        // Monitor unowned, notifications delivered: neither is blocked.
        assert!(!tracker.is_waiting(WorkerId(0)));
        assert!(!tracker.is_waiting(WorkerId(1)));
    }

    #[test]
    fn at_most_one_owner() {
        init_test_logging();
        let mut tracker = MonitorTracker::new(2);
        let m = monitor(7);
        assert!(tracker.acquire(WorkerId(0), m));
        assert!(!tracker.acquire(WorkerId(1), m));
        assert_eq!(tracker.owner(m), Some(WorkerId(0)));
    }
}

//! The scheduling oracle: who runs next.
//!
//! The engine consults an external search strategy at every switch point:
//! `should_switch` decides whether to take the opportunity, `choose_next`
//! picks the successor among the active workers. The built-in
//! [`RandomOracle`] explores interleavings with seed-driven randomness; the
//! [`ScriptedOracle`] follows an explicit decision list, which tests and
//! exact reproductions use.
//!
//! Oracles must be forkable: the driver snapshots the oracle before every
//! invocation so a failing invocation can be re-run with identical
//! decisions.

use crate::types::WorkerId;
use crate::util::DetRng;
use std::collections::VecDeque;

/// Decides where the baton goes.
pub trait SchedulingOracle: Send {
    /// Whether to take the switch opportunity at the current point.
    fn should_switch(&mut self, worker: WorkerId) -> bool;

    /// Picks the next worker among `candidates`.
    ///
    /// Never called with an empty candidate list.
    fn choose_next(&mut self, from: WorkerId, candidates: &[WorkerId]) -> WorkerId;

    /// Snapshots the oracle's current state.
    ///
    /// Re-running an invocation from a fork replays the same decisions.
    fn fork(&self) -> Box<dyn SchedulingOracle>;
}

/// Seed-driven random exploration.
#[derive(Debug, Clone)]
pub struct RandomOracle {
    rng: DetRng,
    switch_num: usize,
    switch_denom: usize,
}

impl RandomOracle {
    /// Creates an oracle switching with the default probability of 1/4.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            rng: DetRng::new(seed),
            switch_num: 1,
            switch_denom: 4,
        }
    }

    /// Sets the switch probability to `num / denom`.
    #[must_use]
    pub const fn with_probability(mut self, num: usize, denom: usize) -> Self {
        self.switch_num = num;
        self.switch_denom = denom;
        self
    }
}

impl SchedulingOracle for RandomOracle {
    fn should_switch(&mut self, _worker: WorkerId) -> bool {
        self.rng.next_ratio(self.switch_num, self.switch_denom)
    }

    fn choose_next(&mut self, _from: WorkerId, candidates: &[WorkerId]) -> WorkerId {
        debug_assert!(!candidates.is_empty(), "choose_next on empty candidates");
        candidates[self.rng.next_usize(candidates.len())]
    }

    fn fork(&self) -> Box<dyn SchedulingOracle> {
        Box::new(self.clone())
    }
}

/// Follows an explicit decision script.
///
/// `should_switch` pops one decision per call and answers `false` once the
/// script is exhausted. `choose_next` pops a preferred worker per switch
/// and falls back to the first candidate when the preference is absent or
/// inactive.
#[derive(Debug, Clone, Default)]
pub struct ScriptedOracle {
    switches: VecDeque<bool>,
    choices: VecDeque<usize>,
}

impl ScriptedOracle {
    /// An oracle that never volunteers a switch.
    #[must_use]
    pub fn passive() -> Self {
        Self::default()
    }

    /// An oracle following the given switch script.
    #[must_use]
    pub fn new(switches: Vec<bool>) -> Self {
        Self {
            switches: switches.into(),
            choices: VecDeque::new(),
        }
    }

    /// Appends preferred successor workers, consumed one per switch.
    #[must_use]
    pub fn with_choices(mut self, choices: Vec<usize>) -> Self {
        self.choices = choices.into();
        self
    }
}

impl SchedulingOracle for ScriptedOracle {
    fn should_switch(&mut self, _worker: WorkerId) -> bool {
        self.switches.pop_front().unwrap_or(false)
    }

    fn choose_next(&mut self, _from: WorkerId, candidates: &[WorkerId]) -> WorkerId {
        debug_assert!(!candidates.is_empty(), "choose_next on empty candidates");
        if let Some(preferred) = self.choices.pop_front() {
            if let Some(&found) = candidates.iter().find(|w| w.index() == preferred) {
                return found;
            }
        }
        candidates[0]
    }

    fn fork(&self) -> Box<dyn SchedulingOracle> {
        Box::new(self.clone())
    }
}

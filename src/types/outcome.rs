//! Invocation outcomes and per-actor result values.

use crate::error::Failure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The value produced by one actor.
///
/// Values are compared for equality when checking that the traced re-run of
/// a failing invocation reproduced the original outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorValue {
    /// No interesting value.
    Unit,
    /// An integer result.
    Int(i64),
    /// A boolean result.
    Bool(bool),
    /// A textual result.
    Text(String),
    /// The actor raised an exception the scenario treats as a value
    /// (expected exception results, not engine failures).
    Exception(String),
}

impl fmt::Display for ActorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unit => write!(f, "void"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Exception(e) => write!(f, "threw {e}"),
        }
    }
}

/// Per-actor results of a completed invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// One result column per worker, parallel to the scenario columns.
    pub results: Vec<Vec<ActorValue>>,
    /// Snapshot of the data structure state after the run, when collected.
    pub state_representation: Option<String>,
}

impl ExecutionResult {
    /// True when at least one actor produced a result.
    #[must_use]
    pub fn has_results(&self) -> bool {
        self.results.iter().map(Vec::len).sum::<usize>() > 0
    }
}

/// The outcome of one invocation of the whole scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// All actors ran to completion; results go to the verifier.
    Completed(ExecutionResult),
    /// The invocation failed.
    Failed(Failure),
}

impl InvocationOutcome {
    /// True when the invocation completed without an engine failure.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Completed(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// True when `other` reproduces this outcome.
    ///
    /// Completed runs must agree on every per-actor value. Failures must
    /// agree on kind, except that the two hang kinds (deadlock and livelock
    /// threshold) are one equivalence class: a measured livelock legally
    /// resurfaces as a deadlock during replay, when the replay helper
    /// escalates at the final recorded switch.
    #[must_use]
    pub fn reproduced_by(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Completed(a), Self::Completed(b)) => a.results == b.results,
            (Self::Failed(a), Self::Failed(b)) => {
                a.kind() == b.kind() || (a.is_hang() && b.is_hang())
            }
            _ => false,
        }
    }
}

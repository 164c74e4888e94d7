//! Error types and the failure taxonomy.
//!
//! Two layers of error exist:
//!
//! - [`EngineError`]: usage and configuration errors surfaced to the caller
//!   before or outside an invocation (invalid thresholds, malformed
//!   scenarios). Explicit and typed, never stringly constructed at call
//!   sites.
//! - [`Failure`]: the verdict of a failed invocation. Failures are values,
//!   not `Err`s: an invocation that deadlocks has *succeeded at finding a
//!   bug*, so the driver returns the failure as data together with its
//!   trace.
//!
//! Monitor-tracker violations get their own error type ([`MonitorError`])
//! because they indicate an instrumentation bug rather than a property of
//! the tested data structure; the scheduler converts them into
//! [`Failure::MonitorInvariantViolation`] and aborts the invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Usage and configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The scenario is malformed (no workers, or an empty worker column).
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

/// Monitor-tracker invariant violations (instrumentation bugs; fatal).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// A monitor was released without a matching acquisition.
    #[error("release of monitor {monitor} that is not acquired")]
    InvalidRelease {
        /// Display form of the offending monitor identity.
        monitor: String,
    },
    /// A worker re-entered `wait` in a state the tracker cannot explain.
    #[error("worker {worker} waits on monitor {monitor} it neither owns nor parked on")]
    InvariantViolation {
        /// The waiting worker.
        worker: usize,
        /// Display form of the offending monitor identity.
        monitor: String,
    },
}

/// The kind of a failure, used for determinism comparison and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No active worker exists while some are unfinished.
    Deadlock,
    /// The global execution counter exceeded its ceiling.
    LivelockThresholdExceeded,
    /// A non-blocking actor acquired a lock, waited, or spun.
    ObstructionFreedomViolation,
    /// A worker raised something other than the forcible-finish signal.
    UnexpectedException,
    /// Actor outcomes were rejected by the verifier.
    IncorrectResults,
    /// A post-run validation function failed.
    ValidationFailure,
    /// The traced re-run produced a different outcome.
    NonDeterminism,
    /// Unbalanced monitor bookkeeping (instrumentation bug).
    MonitorInvariantViolation,
}

impl FailureKind {
    /// Stable, grep-friendly name.
    #[must_use]
    pub const fn stable_name(self) -> &'static str {
        match self {
            Self::Deadlock => "deadlock",
            Self::LivelockThresholdExceeded => "livelock_threshold_exceeded",
            Self::ObstructionFreedomViolation => "obstruction_freedom_violation",
            Self::UnexpectedException => "unexpected_exception",
            Self::IncorrectResults => "incorrect_results",
            Self::ValidationFailure => "validation_failure",
            Self::NonDeterminism => "non_determinism",
            Self::MonitorInvariantViolation => "monitor_invariant_violation",
        }
    }
}

/// The verdict of a failed invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// No active worker exists and at least one is unfinished.
    Deadlock,
    /// Total executions exceeded the livelock ceiling: the scenario makes
    /// steps but no progress.
    LivelockThresholdExceeded,
    /// A non-blocking actor blocked or spun.
    ObstructionFreedomViolation {
        /// What the actor did: "lock", "wait", or "spin".
        blocked_on: &'static str,
    },
    /// A worker panicked with a payload other than the forcible-finish
    /// signal.
    UnexpectedException {
        /// Rendered panic payload.
        message: String,
    },
    /// The verifier rejected the per-actor outcomes.
    IncorrectResults,
    /// A post-run validation function rejected the final state.
    ValidationFailure {
        /// Validation message.
        message: String,
    },
    /// The traced re-run diverged from the original outcome; the original
    /// failure is reported without a trace.
    NonDeterminism,
    /// Unbalanced monitor bookkeeping.
    MonitorInvariantViolation {
        /// Description of the violation.
        message: String,
    },
}

impl Failure {
    /// The kind of this failure.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Deadlock => FailureKind::Deadlock,
            Self::LivelockThresholdExceeded => FailureKind::LivelockThresholdExceeded,
            Self::ObstructionFreedomViolation { .. } => FailureKind::ObstructionFreedomViolation,
            Self::UnexpectedException { .. } => FailureKind::UnexpectedException,
            Self::IncorrectResults => FailureKind::IncorrectResults,
            Self::ValidationFailure { .. } => FailureKind::ValidationFailure,
            Self::NonDeterminism => FailureKind::NonDeterminism,
            Self::MonitorInvariantViolation { .. } => FailureKind::MonitorInvariantViolation,
        }
    }

    /// True for the two hang kinds, which form one equivalence class for
    /// determinism comparison.
    #[must_use]
    pub const fn is_hang(&self) -> bool {
        matches!(self, Self::Deadlock | Self::LivelockThresholdExceeded)
    }

    /// True when a failing invocation of this kind is re-run with tracing
    /// enabled to reconstruct the interleaving.
    ///
    /// Non-determinism and monitor-invariant failures are not traceable:
    /// the former by definition, the latter because the instrumentation
    /// itself is broken.
    #[must_use]
    pub const fn supports_trace(&self) -> bool {
        !matches!(
            self,
            Self::NonDeterminism | Self::MonitorInvariantViolation { .. }
        )
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deadlock => write!(f, "the execution has hung (deadlock or active lock)"),
            Self::LivelockThresholdExceeded => {
                write!(f, "the execution makes steps but no progress (livelock)")
            }
            Self::ObstructionFreedomViolation { blocked_on } => {
                write!(
                    f,
                    "obstruction-freedom is required but a non-blocking operation did {blocked_on}"
                )
            }
            Self::UnexpectedException { message } => {
                write!(f, "unexpected exception in an actor: {message}")
            }
            Self::IncorrectResults => write!(f, "actor results are not linearizable"),
            Self::ValidationFailure { message } => write!(f, "validation failed: {message}"),
            Self::NonDeterminism => write!(
                f,
                "the re-run of a failing invocation produced a different outcome; \
                 the scenario behaves non-deterministically"
            ),
            Self::MonitorInvariantViolation { message } => {
                write!(f, "monitor invariant violated: {message}")
            }
        }
    }
}

impl From<MonitorError> for Failure {
    fn from(err: MonitorError) -> Self {
        Self::MonitorInvariantViolation {
            message: err.to_string(),
        }
    }
}

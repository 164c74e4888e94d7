//! The invocation driver.
//!
//! Runs one scenario attempt end to end:
//!
//! 1. run the invocation under the scheduling oracle;
//! 2. when the spin-loop detector reports a first-time cycle, re-run the
//!    same interleaving with value-view tracking to measure the period,
//!    then continue the attempt with the measured cycle installed so early
//!    detection can skip past it;
//! 3. on a failure whose kind permits it, re-run the invocation with
//!    tracing enabled along the recorded interleaving (truncated to the
//!    last non-cyclic prefix plus one full cycle) and compare outcomes —
//!    a divergent re-run is reported as non-determinism instead of a trace.
//!
//! The driver owns the cycle tracking set across invocations and snapshots
//! the oracle before each attempt so re-runs see identical decisions.

use crate::config::StrategyConfig;
use crate::error::{EngineError, Failure};
use crate::events::WorkerHandle;
use crate::oracle::SchedulingOracle;
use crate::runner::{Continuations, NoSuspensions};
use crate::scheduler::{
    ActorMeta, ForcibleFinish, InvocationArtifacts, InvocationSetup, ManagedScheduler, Sudden,
};
use crate::spin::{truncate_for_replay, CycleTrackingSet, ReplayHelper};
use crate::trace::TraceReport;
use crate::types::{
    Actor, ExecutionResult, InvocationOutcome, Scenario, WorkerId,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Once};
use std::time::Duration;

/// Bound on measuring restarts within one attempt. Each restart installs
/// one newly measured cycle, and the livelock ceiling bounds how many
/// cycles an invocation can contain, so this is a backstop only.
const MAX_RESTARTS: usize = 64;

/// Post-run validation of the final state.
pub type ValidationFn = dyn Fn(&ExecutionResult) -> Result<(), String> + Send;

/// The outcome of one driver attempt, with its diagnostics.
#[derive(Debug)]
pub struct RunReport {
    /// The attempt's outcome.
    pub outcome: InvocationOutcome,
    /// The collected trace, when the outcome is a traceable failure and the
    /// re-run reproduced it.
    pub trace: Option<TraceReport>,
    /// Set to [`Failure::NonDeterminism`] when the traced re-run diverged;
    /// the outcome above is then the first run's, reported without a trace.
    pub warning: Option<Failure>,
}

/// Drives scenario invocations and their diagnostic re-runs.
pub struct InvocationDriver {
    scenario: Scenario,
    config: StrategyConfig,
    oracle: Box<dyn SchedulingOracle>,
    continuations: Arc<dyn Continuations>,
    tracking: CycleTrackingSet,
    validation: Option<Box<ValidationFn>>,
}

impl InvocationDriver {
    /// Creates a driver.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for inconsistent thresholds
    /// and [`EngineError::InvalidScenario`] for an empty scenario or an
    /// empty worker column.
    pub fn new(
        scenario: Scenario,
        config: StrategyConfig,
        oracle: Box<dyn SchedulingOracle>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        if scenario.workers.is_empty() {
            return Err(EngineError::InvalidScenario(
                "scenario has no workers".to_string(),
            ));
        }
        if let Some(empty) = scenario.workers.iter().position(Vec::is_empty) {
            return Err(EngineError::InvalidScenario(format!(
                "worker {empty} has no actors"
            )));
        }
        Ok(Self {
            scenario,
            config,
            oracle,
            continuations: Arc::new(NoSuspensions),
            tracking: CycleTrackingSet::new(),
            validation: None,
        })
    }

    /// Installs the runner's continuation/state-capture contract.
    #[must_use]
    pub fn with_continuations(mut self, continuations: Arc<dyn Continuations>) -> Self {
        self.continuations = continuations;
        self
    }

    /// Installs a post-run validation function.
    #[must_use]
    pub fn with_validation(
        mut self,
        validation: impl Fn(&ExecutionResult) -> Result<(), String> + Send + 'static,
    ) -> Self {
        self.validation = Some(Box::new(validation));
        self
    }

    /// Runs one attempt: the invocation, its measuring restarts, and the
    /// trace-collection pass for a reportable failure.
    pub fn run(&mut self) -> RunReport {
        silence_forcible_finish_panics();
        let base = self.oracle.fork();

        // Search pass, restarting while the detector measures spin cycles.
        let mut extra_tracking = false;
        let mut attempts = 0;
        let mut artifacts = loop {
            let artifacts = self.run_invocation(base.fork(), extra_tracking, None, false);
            attempts += 1;
            if attempts >= MAX_RESTARTS {
                break artifacts;
            }
            match &artifacts.sudden {
                Some(Sudden::SpinCycleFirstDetected) => {
                    extra_tracking = true;
                }
                Some(Sudden::SpinCyclePeriodMeasured) => {
                    self.tracking.add_interleaving(&artifacts.interleavings);
                }
                _ => break artifacts,
            }
        };
        let outcome = self.outcome_of(&mut artifacts);

        let Some(failure) = outcome.failure().cloned() else {
            return RunReport {
                outcome,
                trace: None,
                warning: None,
            };
        };
        if !failure.supports_trace() {
            return RunReport {
                outcome,
                trace: None,
                warning: None,
            };
        }

        // Trace-collection pass along the recorded interleaving.
        let history = truncate_for_replay(artifacts.interleavings.clone());
        let replay = ReplayHelper::new(history, failure.is_hang(), extra_tracking);
        let mut traced = self.run_invocation(base.fork(), extra_tracking, Some(replay), true);
        let traced_outcome = self.outcome_of(&mut traced);

        if outcome.reproduced_by(&traced_outcome) {
            let report = TraceReport::new(failure, self.actor_names(), traced.entries);
            RunReport {
                outcome,
                trace: Some(report),
                warning: None,
            }
        } else {
            RunReport {
                outcome,
                trace: None,
                warning: Some(Failure::NonDeterminism),
            }
        }
    }

    /// Runs a single invocation to its terminal state.
    fn run_invocation(
        &mut self,
        oracle: Box<dyn SchedulingOracle>,
        extra_tracking: bool,
        replay: Option<ReplayHelper>,
        collect_trace: bool,
    ) -> InvocationArtifacts {
        let meta: Vec<Vec<ActorMeta>> = self
            .scenario
            .workers
            .iter()
            .map(|column| {
                column
                    .iter()
                    .map(|actor| ActorMeta {
                        name: actor.name.clone(),
                        blocking: actor.blocking,
                        causes_blocking: actor.causes_blocking,
                    })
                    .collect()
            })
            .collect();
        let setup = InvocationSetup {
            config: self.config.clone(),
            meta,
            oracle,
            continuations: Arc::clone(&self.continuations),
            tracking: std::mem::take(&mut self.tracking),
            extra_tracking,
            replay,
            collect_trace,
        };
        let scheduler = ManagedScheduler::new(setup);

        let handles: Vec<_> = self
            .scenario
            .workers
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let scheduler = Arc::clone(&scheduler);
                let actors = column.clone();
                std::thread::Builder::new()
                    .name(format!("lockstep-worker-{index}"))
                    .spawn(move || worker_body(&scheduler, WorkerId(index), &actors))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        let budget = Duration::from_millis(self.config.timeout_ms);
        if !scheduler.wait_for_workers(budget) {
            // Wall-clock expiry counts as a hang.
            scheduler.abort_invocation(Failure::Deadlock);
            scheduler.wait_for_workers(budget);
        }
        for handle in handles {
            let _ = handle.join();
        }

        let mut artifacts = scheduler.take_artifacts();
        self.tracking = std::mem::take(&mut artifacts.tracking);
        artifacts
    }

    /// Converts artifacts into the invocation outcome, applying post-run
    /// validation to completed runs.
    fn outcome_of(&self, artifacts: &mut InvocationArtifacts) -> InvocationOutcome {
        match artifacts.sudden.take() {
            Some(Sudden::Failed(failure)) => InvocationOutcome::Failed(failure),
            // Measuring restarts are consumed by the attempt loop; one
            // surviving here means the restart budget ran out while the
            // scenario kept producing fresh cycles.
            Some(Sudden::SpinCycleFirstDetected | Sudden::SpinCyclePeriodMeasured) => {
                InvocationOutcome::Failed(Failure::LivelockThresholdExceeded)
            }
            None => {
                let result = ExecutionResult {
                    results: std::mem::take(&mut artifacts.results),
                    state_representation: self.continuations.capture_state_representation(),
                };
                if let Some(validation) = &self.validation {
                    if let Err(message) = validation(&result) {
                        return InvocationOutcome::Failed(Failure::ValidationFailure { message });
                    }
                }
                InvocationOutcome::Completed(result)
            }
        }
    }

    fn actor_names(&self) -> Vec<Vec<String>> {
        self.scenario
            .workers
            .iter()
            .map(|column| column.iter().map(|actor| actor.name.clone()).collect())
            .collect()
    }
}

/// One worker thread: runs its actor column under the scheduler.
fn worker_body(scheduler: &Arc<ManagedScheduler>, worker: WorkerId, actors: &[Actor]) {
    let handle = WorkerHandle::new(Arc::clone(scheduler), worker);
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        scheduler.on_start(worker);
        for (index, actor) in actors.iter().enumerate() {
            scheduler.on_actor_start(worker, index);
            let value = (actor.op)(&handle);
            scheduler.on_actor_result(worker, value);
        }
        scheduler.on_finish(worker);
    }));
    if let Err(payload) = outcome {
        scheduler.on_forced_finish(worker);
        if payload.downcast_ref::<ForcibleFinish>().is_none() {
            scheduler.on_unexpected_panic(worker, panic_message(payload.as_ref()));
        }
    }
    scheduler.worker_exited();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Keeps routine forcible-finish unwinds out of stderr while leaving the
/// default hook in place for genuine panics.
fn silence_forcible_finish_panics() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if info.payload().downcast_ref::<ForcibleFinish>().is_none() {
                previous(info);
            }
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::ScriptedOracle;
    use crate::types::{Actor, ActorValue};

    fn noop_scenario(width: usize) -> Scenario {
        let mut scenario = Scenario::new();
        for w in 0..width {
            scenario = scenario.worker(vec![Actor::new(format!("noop{w}()"), |_| {
                ActorValue::Unit
            })]);
        }
        scenario
    }

    #[test]
    fn rejects_empty_scenario() {
        let result = InvocationDriver::new(
            Scenario::new(),
            StrategyConfig::new(1),
            Box::new(ScriptedOracle::passive()),
        );
        assert!(matches!(result, Err(EngineError::InvalidScenario(_))));
    }

    #[test]
    fn rejects_empty_worker_column() {
        let scenario = Scenario::new().worker(Vec::new());
        let result = InvocationDriver::new(
            scenario,
            StrategyConfig::new(1),
            Box::new(ScriptedOracle::passive()),
        );
        assert!(matches!(result, Err(EngineError::InvalidScenario(_))));
    }

    #[test]
    fn rejects_inconsistent_thresholds() {
        let config = StrategyConfig::new(1)
            .hanging_detection_threshold(10)
            .livelock_events_threshold(10);
        let result = InvocationDriver::new(
            noop_scenario(1),
            config,
            Box::new(ScriptedOracle::passive()),
        );
        assert!(matches!(result, Err(EngineError::InvalidConfig(_))));
    }

    #[test]
    fn trivial_scenario_completes() {
        let mut driver = InvocationDriver::new(
            noop_scenario(2),
            StrategyConfig::new(1),
            Box::new(ScriptedOracle::passive()),
        )
        .unwrap();
        let report = driver.run();
        let InvocationOutcome::Completed(result) = report.outcome else {
            panic!("expected completion, got {:?}", report.outcome);
        };
        assert!(result.has_results());
        assert_eq!(result.results[0], vec![ActorValue::Unit]);
        assert!(report.trace.is_none());
        assert!(report.warning.is_none());
    }

    #[test]
    fn validation_failure_is_reported() {
        let mut driver = InvocationDriver::new(
            noop_scenario(1),
            StrategyConfig::new(1),
            Box::new(ScriptedOracle::passive()),
        )
        .unwrap()
        .with_validation(|_| Err("state is inconsistent".to_string()));
        let report = driver.run();
        assert!(matches!(
            report.outcome,
            InvocationOutcome::Failed(Failure::ValidationFailure { .. })
        ));
        // The traced re-run reproduces the validation failure, so a trace
        // is attached.
        assert!(report.trace.is_some());
    }
}

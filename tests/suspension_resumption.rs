//! Suspension and resumption: a suspended worker is never scheduled until
//! the runner reports its continuation resumable, and a resumed call keeps
//! its method identity.

use lockstep::oracle::ScriptedOracle;
use lockstep::runner::ResumeLatch;
use lockstep::test_utils::init_test_logging;
use lockstep::types::CodeLocationRegistry;
use lockstep::{
    Actor, ActorValue, InvocationDriver, InvocationOutcome, Scenario, StrategyConfig, WorkerId,
};
use parking_lot::Mutex;
use std::sync::Arc;

type StepLog = Arc<Mutex<Vec<&'static str>>>;

#[test]
fn suspended_worker_waits_for_resumption() {
    init_test_logging();
    lockstep::test_phase!("suspended_worker_waits_for_resumption");
    let registry = CodeLocationRegistry::new();
    let cl_send = registry.helper("send(value)");
    let cl_touch = registry.switch_point("channel.state.read");

    let latch = Arc::new(ResumeLatch::new());
    let log: StepLog = Arc::new(Mutex::new(Vec::new()));

    let suspender = {
        let log = Arc::clone(&log);
        Actor::new("send(1)", move |h| {
            h.before_method_call(cl_send, "send(1)", &[]);
            log.lock().push("w0:suspending");
            // The call suspends; its identity is preserved for the
            // resumption.
            h.after_method_call(true);
            h.after_coroutine_suspended();
            h.before_coroutine_resumed();
            log.lock().push("w0:resumed");
            h.before_method_call(cl_send, "send(1)", &[]);
            h.after_method_call(false);
            ActorValue::Unit
        })
        .blocking()
    };
    let resumer = {
        let latch = Arc::clone(&latch);
        let log = Arc::clone(&log);
        Actor::new("receive()", move |h| {
            h.before_read(cl_touch, "channel.state.read");
            log.lock().push("w1:resuming");
            latch.resume(WorkerId(0), 0);
            ActorValue::Int(1)
        })
        .causes_blocking()
    };
    let scenario = Scenario::new().worker(vec![suspender]).worker(vec![resumer]);

    let mut driver = InvocationDriver::new(
        scenario,
        StrategyConfig::new(5),
        Box::new(ScriptedOracle::passive()),
    )
    .expect("valid setup")
    .with_continuations(latch);
    let report = driver.run();

    assert!(
        matches!(report.outcome, InvocationOutcome::Completed(_)),
        "got {:?}",
        report.outcome
    );
    // Worker 0 never ran between suspension and resumption.
    let steps = log.lock().clone();
    assert_eq!(steps, vec!["w0:suspending", "w1:resuming", "w0:resumed"]);
    lockstep::test_complete!("suspended_worker_waits_for_resumption");
}

#[test]
fn already_resumable_suspension_continues_in_place() {
    init_test_logging();
    let registry = CodeLocationRegistry::new();
    let cl_recv = registry.helper("receive()");

    // The latch is pre-resumed: suspension records the sentinel switch
    // point and execution continues without a forced switch.
    let latch = Arc::new(ResumeLatch::new());
    latch.resume(WorkerId(0), 0);

    let actor = Actor::new("receive()", move |h| {
        h.before_method_call(cl_recv, "receive()", &[]);
        h.after_method_call(true);
        h.after_coroutine_suspended();
        h.before_coroutine_resumed();
        h.before_method_call(cl_recv, "receive()", &[]);
        h.after_method_call(false);
        ActorValue::Int(7)
    });
    let scenario = Scenario::new().worker(vec![actor]);

    let mut driver = InvocationDriver::new(
        scenario,
        StrategyConfig::new(5),
        Box::new(ScriptedOracle::passive()),
    )
    .expect("valid setup")
    .with_continuations(latch);
    let report = driver.run();

    let InvocationOutcome::Completed(result) = report.outcome else {
        panic!("expected completion, got {:?}", report.outcome);
    };
    assert_eq!(result.results[0], vec![ActorValue::Int(7)]);
}

//! Lockstep: a managed concurrency model checker.
//!
//! Lockstep drives a fixed scenario of concurrent operations over a
//! user-supplied data structure through carefully chosen thread
//! interleavings. Worker threads run strictly one at a time under a
//! cooperative baton scheduler; instrumented operations report every shared
//! read, write, lock operation, wait, park, and method call to the engine,
//! which decides at each such point whether to hand the baton to another
//! worker.
//!
//! The engine detects:
//!
//! - **Deadlocks**: no worker can make progress while some are unfinished.
//! - **Livelocks / active locks**: a worker repeats an unproductive cycle of
//!   events; the spin-loop detector identifies the cycle, measures its
//!   period, and on replay reconstructs a compact "these events repeat
//!   infinitely" trace.
//! - **Obstruction-freedom violations**: a declared non-blocking operation
//!   acquires a lock, waits on a monitor, or spins.
//! - **Unexpected panics** escaping an operation.
//!
//! On a failure, the invocation is re-run with tracing enabled along the
//! exact same interleaving; if the second run diverges, the failure is
//! reported with an explicit non-determinism warning instead of a trace.
//!
//! # Architecture
//!
//! - [`scheduler`]: the cooperative baton scheduler owning "which worker may
//!   run now" and the per-worker finished/suspended bookkeeping.
//! - [`events`]: the interception surface instrumented code calls into.
//! - [`spin`]: the spin-loop detector (visit counting, cycle identification,
//!   replay-mode cycle reproduction).
//! - [`monitor`]: deterministic semantics for mutual-exclusion monitors.
//! - [`stack`]: per-worker call stacks, stable across suspension.
//! - [`objects`]: tracking of objects not yet published to shared state.
//! - [`trace`]: the append-only interleaving trace and its textual report.
//! - [`driver`]: runs invocations, restarts for spin-cycle measurement, and
//!   performs the determinism-checked trace-collection pass.
//!
//! # Example
//!
//! ```ignore
//! use lockstep::{Actor, ActorValue, InvocationDriver, Scenario, StrategyConfig};
//! use lockstep::oracle::RandomOracle;
//!
//! let scenario = Scenario::new()
//!     .worker(vec![Actor::new("inc", |h| { /* instrumented op */ ActorValue::Unit })])
//!     .worker(vec![Actor::new("get", |h| { /* instrumented op */ ActorValue::Int(0) })]);
//!
//! let config = StrategyConfig::new(42);
//! let mut driver = InvocationDriver::new(scenario, config, Box::new(RandomOracle::new(42)))?;
//! let report = driver.run();
//! # Ok::<(), lockstep::EngineError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod driver;
pub mod error;
pub mod events;
pub mod monitor;
pub mod objects;
pub mod oracle;
pub mod runner;
pub mod scheduler;
pub mod spin;
pub mod stack;
pub mod trace;
pub mod types;
pub mod util;

#[doc(hidden)]
pub mod test_utils;

pub use config::StrategyConfig;
pub use driver::{InvocationDriver, RunReport};
pub use error::{EngineError, Failure};
pub use events::WorkerHandle;
pub use oracle::{RandomOracle, SchedulingOracle, ScriptedOracle};
pub use runner::Continuations;
pub use scheduler::ForcibleFinish;
pub use types::{
    Actor, ActorId, ActorValue, CodeLocation, CodeLocationRegistry, ExecutionResult,
    InvocationOutcome, ObjectRef, Scenario, WorkerId,
};

//! Core types for the Lockstep engine.
//!
//! - [`id`]: identifier types (`WorkerId`, `ActorId`, `CodeLocation`,
//!   `MethodId`, `ObjectRef`) and the code-location registry.
//! - [`actor`]: the scenario model (actor descriptors, worker columns).
//! - [`outcome`]: invocation outcomes and per-actor result values.

pub mod actor;
pub mod id;
pub mod outcome;

pub use actor::{Actor, ActorOp, Scenario};
pub use id::{
    CodeLocation, CodeLocationRegistry, MethodId, ObjectRef, WorkerId, LEAST_CODE_LOCATION_ID,
};
pub use outcome::{ActorValue, ExecutionResult, InvocationOutcome};

/// Index of an actor within its worker's column.
pub type ActorId = usize;
